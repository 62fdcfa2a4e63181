use agent_chat_stream::prelude::*;
use agent_chat_stream::init_observability;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    init_observability();
    let client = A2aClient::from_env()?;
    let session = client.session();
    let turn = TurnId::generate();

    let mut stream = session
        .send(OutgoingMessage::text("What changed in the last deploy?"), turn.clone())
        .await?;

    let mut content = ContentAccumulator::new();
    while let Some(event) = stream.next_event().await {
        content.fold(&event);
    }

    for (agent, entry) in content.snapshot(&turn) {
        println!("[{agent}] {}", entry.text);
    }
    match stream.outcome() {
        Some(StreamOutcome::Completed { incomplete: true }) => eprintln!("response incomplete"),
        Some(StreamOutcome::Failed(failure)) => eprintln!("stream failed: {failure}"),
        _ => {}
    }
    Ok(())
}
