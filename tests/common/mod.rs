#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use weather_agent::{
    AiError, ChatModel, Choice, CompletionProvider, CompletionRequest, CompletionResponse, Message,
    MessageContent, Role, ToolCall, Usage,
};

/// Provider that replays canned assistant turns and records every request
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> weather_agent::Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = self.replies.lock().unwrap().pop_front().ok_or_else(|| AiError::InternalError {
            message: "script exhausted".to_string(),
            component: Some("scripted".to_string()),
        })?;

        Ok(CompletionResponse {
            id: format!("resp-{}", self.requests.lock().unwrap().len()),
            model: request.model,
            choices: vec![Choice {
                index: 0,
                message: reply,
                finish_reason: Some("STOP".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn default_model(&self) -> &'static str {
        "scripted-model"
    }
}

/// A chat model over a script, plus the handle to its recorded requests
pub fn scripted_model(replies: Vec<Message>) -> (ChatModel, Arc<Mutex<Vec<CompletionRequest>>>) {
    let provider = ScriptedProvider::new(replies);
    let requests = provider.requests();
    (ChatModel::from_provider(provider).temperature(0.7).max_tokens(1000), requests)
}

/// Assistant turn that only calls tools
pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Message {
    Message {
        role: Role::Assistant,
        content: MessageContent::text(""),
        tool_calls: Some(
            calls
                .iter()
                .map(|(id, name, args)| ToolCall::new(*id, *name, args.to_string()))
                .collect(),
        ),
        tool_call_id: None,
        name: None,
    }
}

pub fn tool_call(id: &str, name: &str, args: Value) -> Message {
    tool_calls(&[(id, name, args)])
}

/// Tool messages of a conversation, as (name, content) pairs
pub fn tool_outputs(messages: &[Message]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.name.clone().unwrap_or_default(), m.content.to_text()))
        .collect()
}
