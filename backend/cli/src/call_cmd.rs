//! `sudsline call`: place one call from the terminal and follow it.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::broadcast::error::RecvError;

use sudsline_config::SudslineConfig;
use sudsline_core::CallEvent;
use sudsline_session::{CallSessionManager, StartCallRequest};
use sudsline_vendor::VapiConnector;

use crate::config::Config;

pub struct CallArgs {
    pub assistant: String,
    pub phone: String,
    pub caller_name: Option<String>,
    pub context: Option<String>,
}

pub async fn run(config: &Config, file: &SudslineConfig, args: CallArgs) -> Result<()> {
    let manager = CallSessionManager::new(
        Arc::new(VapiConnector::new(config.vendor.clone())),
        config.session.clone(),
    );
    let mut events = manager.subscribe();

    let request = StartCallRequest {
        assistant_name: file
            .assistant(&args.assistant)
            .map(|a| a.name.clone())
            .unwrap_or_default(),
        assistant_id: args.assistant,
        phone_number: Some(args.phone),
        caller_name: args.caller_name,
        context: args.context,
        ..Default::default()
    };

    let outcome = manager.start_call(request).await;
    if !outcome.success {
        manager.cleanup().await;
        bail!(outcome.message);
    }
    println!("{}  (Ctrl-C to hang up)", outcome.message);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let stopped = manager.stop_call(Some("stopped from terminal")).await;
                println!("{}", stopped.message);
                break;
            }
            event = events.recv() => match event {
                Ok(CallEvent::Log { entry }) => println!("{}", entry),
                Ok(CallEvent::Heartbeat { elapsed_secs, .. }) => println!("  ... {}s", elapsed_secs),
                Ok(CallEvent::Ended { record }) => {
                    println!(
                        "Call finished: {} after {}s",
                        record.end_reason.as_deref().unwrap_or("ended"),
                        record.duration_secs.unwrap_or_default()
                    );
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    manager.cleanup().await;
    Ok(())
}
