//! `metrics`: poll one host and print each snapshot as it arrives.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use fleetshell::channel::{mpsc_sink, ChannelMessage};
use fleetshell::metrics::{MetricsCollector, MetricsSnapshot};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Arguments for the metrics command
#[derive(Parser, Debug, Clone)]
pub struct MetricsArgs {
    /// Stored host address
    pub address: String,

    /// Stop after this many snapshots (default: until Ctrl-C)
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,

    /// Seconds between snapshots
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,
}

impl MetricsArgs {
    /// Execute the command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let record = ctx.open_store()?.get(&self.address)?;

        let interval = self
            .interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| ctx.config.metrics_interval());

        let collector = MetricsCollector::new(ctx.connector())
            .with_specs(ctx.config.metrics.commands.clone())
            .with_interval(interval)
            .with_command_timeout(ctx.config.metrics_command_timeout())
            .with_max_cycles(self.cycles);

        let cancel = CancellationToken::new();
        let (mut sink, mut rx) = mpsc_sink(4);

        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let host = record.host;
        let poll = tokio::spawn(async move {
            collector.start_polling(&host, &mut sink, &cancel).await
        });

        let mut last_text = None;
        while let Some(message) = rx.recv().await {
            let ChannelMessage::Text(text) = message else {
                continue;
            };
            match serde_json::from_str::<MetricsSnapshot>(&text) {
                Ok(snapshot) => ctx.output.snapshot(&self.address, &snapshot),
                Err(_) => last_text = Some(text),
            }
            ctx.output.flush();
        }

        ctrl_c.abort();
        match poll.await? {
            Ok(_) => Ok(0),
            Err(e) => {
                ctx.output.error(&last_text.unwrap_or_else(|| e.to_string()));
                Ok(3)
            }
        }
    }
}
