//! Event tailing command.

use crate::render;
use crate::Overrides;
use clap::Args;
use futures::StreamExt;
use gatelink_client::{GatewayClient, TopicFilter};

/// Watch command arguments.
#[derive(Args)]
pub struct WatchArgs {
    /// Only show events on this topic (default: all)
    #[arg(short, long)]
    pub topic: Option<String>,
}

/// Subscription filter for the given topic flag.
pub fn filter_for(topic: Option<&str>) -> TopicFilter {
    match topic {
        None | Some("*") => TopicFilter::Any,
        Some(topic) => TopicFilter::topic(topic),
    }
}

/// Run the watch command until Ctrl-C.
pub async fn run(args: WatchArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;

    // Subscribe before connecting so the first state changes are shown too.
    let client = GatewayClient::new(config)?;
    let mut events = client.subscribe(filter_for(args.topic.as_deref()));
    client.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => render::render_event(&event),
                None => break,
            },
        }
    }

    client.disconnect();
    Ok(())
}
