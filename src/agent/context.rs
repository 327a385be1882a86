use crate::Message;

/// Per-call view of the running agent handed to every tool
///
/// `context` is the value passed to [`Agent::invoke`](super::Agent::invoke),
/// so tools can read caller-supplied data such as the current user.
#[derive(Debug)]
pub struct ToolRuntime<'a, C> {
    pub context: &'a C,
    /// Id of the tool call being answered
    pub tool_call_id: &'a str,
    pub thread_id: Option<&'a str>,
    /// Conversation so far, including the assistant turn that made the call
    pub messages: &'a [Message],
}

impl<'a, C> ToolRuntime<'a, C> {
    pub fn new(context: &'a C, tool_call_id: &'a str, messages: &'a [Message]) -> Self {
        Self {
            context,
            tool_call_id,
            thread_id: None,
            messages,
        }
    }

    pub fn with_thread(mut self, thread_id: Option<&'a str>) -> Self {
        self.thread_id = thread_id;
        self
    }
}

impl<C> Clone for ToolRuntime<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ToolRuntime<'_, C> {}
