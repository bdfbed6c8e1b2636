use {
    anyhow::Result,
    clap::Args,
    tocsin_config::TocsinConfig,
    tocsin_scheduler::{parse::format_ms, types::CompletedJob},
};

use crate::storage;

#[derive(Args)]
pub struct HistoryArgs {
    /// Maximum number of records to show.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
    /// Only show executions of this job id.
    #[arg(long)]
    pub id: Option<String>,
    /// Print raw JSON records.
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_history(config: &TocsinConfig, args: &HistoryArgs) -> Result<()> {
    let storage = storage::open(config).await?;
    let records = match &args.id {
        Some(id) => storage.archive.history(id, args.limit).await?,
        None => storage.archive.list(0, args.limit).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No completed jobs.");
    }
    for record in &records {
        println!("{}", summary_line(record));
    }
    Ok(())
}

fn summary_line(record: &CompletedJob) -> String {
    let mut line = format!(
        "{}  {:<14}  {:>3}  {} {}  {}",
        format_ms(record.completed_at_ms),
        record.status.as_str(),
        record.response.status_code,
        record.request.method,
        record.request.url,
        record.id,
    );
    if let Some(err) = &record.error_message {
        line.push_str("  ");
        line.push_str(err);
    }
    line
}
