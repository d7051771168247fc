use colored::Colorize;
use events::{Event, EventBus};
use std::io::Write;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Status line for an event; `None` for events shown some other way.
pub fn describe(event: &Event) -> Option<String> {
    match event {
        Event::ConnectAttempt {
            attempt,
            max_attempts,
            error: Some(code),
        } => Some(format!(
            "Connect attempt {attempt}/{max_attempts} failed: {code}"
        )),
        Event::ConnectAttempt { error: None, .. } => None,
        Event::ConnectProgress { .. } => None,
        Event::ConnectFinished { state, attempts } if state.is_connected() => Some(format!(
            "Connection Established. ({attempts} attempt{})",
            if *attempts == 1 { "" } else { "s" }
        )),
        Event::ConnectFinished { state, .. } => Some(format!("Connection failed: {state}")),
        Event::LinkStatusChanged { class } => Some(format!("Network status: {class}")),
        Event::PhaseEntered { phase } => Some(format!("[{phase}]")),
        Event::TransactionFinished { transport, result } if result.is_ok() => Some(format!(
            "{}: sent {} bytes, received {} bytes",
            transport.label(),
            result.bytes_sent,
            result.bytes_received
        )),
        Event::TransactionFinished { transport, result } => Some(match result.error {
            Some(code) => format!("{}: {} ({code})", transport.label(), result.outcome),
            None => format!("{}: {}", transport.label(), result.outcome),
        }),
        Event::Disconnected { error: None } => Some("Disconnected".to_string()),
        Event::Disconnected { error: Some(code) } => Some(format!("Disconnect failed: {code}")),
        Event::RunFinished { success: true } => Some("Success. Exiting".to_string()),
        Event::RunFinished { success: false } => Some("Failure. Exiting".to_string()),
        Event::Error { message, context } => Some(match context {
            Some(context) => format!("Error ({context}): {message}"),
            None => format!("Error: {message}"),
        }),
    }
}

/// Print bus events to stdout until the run finishes or the bus closes.
pub fn spawn_printer(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        let mut dots = false;
        loop {
            let envelope = match rx.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status printer fell behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Event::ConnectProgress { .. } = envelope.event {
                print!(".");
                let _ = std::io::stdout().flush();
                dots = true;
                continue;
            }

            let Some(line) = describe(&envelope.event) else {
                continue;
            };
            if dots {
                println!();
                dots = false;
            }

            match envelope.event {
                Event::RunFinished { success: true } => {
                    println!("{}", line.green().bold());
                    break;
                }
                Event::RunFinished { success: false } => {
                    println!("{}", line.red().bold());
                    break;
                }
                Event::Error { .. } => println!("{}", line.red()),
                _ => println!("{line}"),
            }
        }
    })
}
