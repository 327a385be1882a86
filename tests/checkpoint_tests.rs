mod common;

use common::{scripted_model, tool_call};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use weather_agent::agent::{AgentState, Checkpoint, Checkpointer, InMemorySaver, RunConfig, SqliteSaver};
use weather_agent::weather::{forecaster_agent, UserContext};
use weather_agent::Message;

fn state(texts: &[&str]) -> AgentState {
    AgentState {
        messages: texts.iter().map(|t| Message::user(*t)).collect(),
        structured_response: None,
    }
}

/// Behaviour every checkpointer must share
async fn exercise_checkpointer(saver: &dyn Checkpointer) {
    assert!(saver.get("1").await.unwrap().is_none());
    assert!(saver.list("1", None).await.unwrap().is_empty());

    let first = Checkpoint::next("1", None, &state(&["hello"]));
    let mut second = Checkpoint::next("1", Some(&first), &state(&["hello", "again"]));
    second.structured_response = Some(json!({"punny_response": "hi"}));
    let other = Checkpoint::next("2", None, &state(&["elsewhere"]));

    saver.put(first.clone()).await.unwrap();
    saver.put(other.clone()).await.unwrap();
    saver.put(second.clone()).await.unwrap();

    let latest = saver.get("1").await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.step, 1);
    assert_eq!(latest.messages.len(), 2);
    assert_eq!(latest.structured_response, Some(json!({"punny_response": "hi"})));

    let history = saver.list("1", None).await.unwrap();
    assert_eq!(
        history.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
        vec![second.id.clone(), first.id.clone()]
    );
    assert_eq!(saver.list("1", Some(1)).await.unwrap().len(), 1);

    saver.delete_thread("1").await.unwrap();
    assert!(saver.get("1").await.unwrap().is_none());
    assert_eq!(saver.get("2").await.unwrap().map(|c| c.id), Some(other.id));
}

#[tokio::test]
async fn test_in_memory_saver() {
    let saver = InMemorySaver::new();
    exercise_checkpointer(&saver).await;
}

#[tokio::test]
async fn test_in_memory_saver_clones_share_state() {
    let saver = InMemorySaver::new();
    let clone = saver.clone();

    clone
        .put(Checkpoint::next("t", None, &state(&["x"])))
        .await
        .unwrap();
    assert!(saver.get("t").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sqlite_saver_in_memory() {
    let saver = SqliteSaver::in_memory().await.unwrap();
    exercise_checkpointer(&saver).await;
}

#[tokio::test]
async fn test_sqlite_saver_persists_across_connections() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("checkpoints.db").display());

    let checkpoint = Checkpoint::next("thread", None, &state(&["remember me"]));
    {
        let saver = SqliteSaver::connect(&url).await.unwrap();
        saver.put(checkpoint.clone()).await.unwrap();
    }

    let reopened = SqliteSaver::connect(&url).await.unwrap();
    let loaded = reopened.get("thread").await.unwrap().unwrap();
    assert_eq!(loaded, checkpoint);
}

#[tokio::test]
async fn test_thread_resumes_with_new_agent_instance() {
    let saver: Arc<dyn Checkpointer> = Arc::new(SqliteSaver::in_memory().await.unwrap());
    let context = UserContext::new("1");
    let run = RunConfig::for_thread("1");

    let (model, _) = scripted_model(vec![tool_call(
        "c1",
        "WeatherReport",
        json!({"punny_response": "Hello, sunshine!"}),
    )]);
    let agent = forecaster_agent(model, saver.clone(), None).unwrap();
    agent.invoke("Hi there", &run, &context).await.unwrap();

    let (model, requests) = scripted_model(vec![tool_call(
        "c2",
        "WeatherReport",
        json!({"punny_response": "Thanks a ton-ado!"}),
    )]);
    let agent = forecaster_agent(model, saver.clone(), None).unwrap();
    let report = agent.invoke("Thank you!", &run, &context).await.unwrap();
    assert_eq!(report.punny_response, "Thanks a ton-ado!");

    let state = agent.inner().get_state("1").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 6);
    assert_eq!(state.structured_response, Some(json!({"punny_response": "Thanks a ton-ado!"})));

    let requests = requests.lock().unwrap();
    // system + user + structured call + its tool message + new user message
    assert_eq!(requests[0].messages.len(), 5);
    assert_eq!(requests[0].messages[1], Message::user("Hi there"));
}
