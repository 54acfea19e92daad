//! Raw request command.

use crate::render;
use crate::Overrides;
use clap::Args;
use gatelink_client::CallPath;
use serde_json::Value;
use tracing::debug;

/// Call command arguments.
#[derive(Args)]
pub struct CallArgs {
    /// Method name
    pub method: String,

    /// Parameters as a JSON document
    pub params: Option<String>,
}

/// Parse the optional params argument.
pub fn parse_params(raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid params JSON: {}", e)),
    }
}

/// Run the call command.
pub async fn run(args: CallArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let params = parse_params(args.params.as_deref())?;
    let client = super::connect(overrides.load()?).await?;

    let routed = client.call(&args.method, params).await?;
    if routed.path == CallPath::Fallback {
        debug!(method = %args.method, "Answered over HTTP fallback");
    }
    render::render_json(&routed.value);

    client.disconnect();
    Ok(())
}
