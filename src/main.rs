//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run
//! one inspector command. No business logic here.

use clap::{Parser, Subcommand};
use group_ledger::adapters::notifications::{LogNotificationSink, WebhookNotificationSink};
use group_ledger::adapters::persistence::SqliteStore;
use group_ledger::domain::{Balances, Group, GroupId, MemberId};
use group_ledger::ports::{LedgerStore, NotificationSink};
use group_ledger::shared::LedgerConfig;
use group_ledger::usecases::{ExpenseService, SettlementService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Inspect and settle group ledgers stored in `ledger.db`.
#[derive(Debug, Parser)]
#[command(name = "group-ledger", version, about)]
struct Cli {
    /// Directory holding ledger.db (overrides GROUP_LEDGER_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every member's balance.
    Balances { group: String },
    /// Print the transfers that would settle the group.
    Suggest { group: String },
    /// Record the suggested settlements the acting member may apply.
    SettleAll {
        group: String,
        /// Acting member id.
        #[arg(long = "as", value_name = "MEMBER")]
        acting: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = LedgerConfig::load()?;

    let data_dir = cli.data_dir.unwrap_or_else(|| cfg.data_dir_or_default());
    let store = Arc::new(
        SqliteStore::connect(&data_dir)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    let store: Arc<dyn LedgerStore> = store;

    let notifier: Arc<dyn NotificationSink> = match cfg.webhook_url() {
        Some(url) => {
            info!(url, "notifications go to webhook");
            Arc::new(WebhookNotificationSink::new(
                url.to_string(),
                cfg.webhook_token.clone(),
                cfg.webhook_timeout(),
            )?)
        }
        None => Arc::new(LogNotificationSink),
    };

    let expenses = ExpenseService::new(Arc::clone(&store), Arc::clone(&notifier));
    let settlements = SettlementService::new(Arc::clone(&store), notifier);

    match cli.command {
        Command::Balances { group } => {
            let group_id = GroupId::from(group);
            let group = store.fetch_group(&group_id).await?;
            let view = expenses.ledger(&group_id).await?;
            println!("{} (version {})", group.id, view.version);
            print_balances(&group, &view.balances);
        }
        Command::Suggest { group } => {
            let group_id = GroupId::from(group);
            let group = store.fetch_group(&group_id).await?;
            let plan = settlements.suggest_settlements(&group_id).await?;
            if plan.transfers.is_empty() {
                println!("{} is settled", group.id);
            }
            for t in &plan.transfers {
                println!(
                    "{} -> {}: {}",
                    group.display_name(&t.from),
                    group.display_name(&t.to),
                    t.amount.format(&group.home_currency)
                );
            }
        }
        Command::SettleAll { group, acting } => {
            let group_id = GroupId::from(group);
            let acting = MemberId::from(acting);
            let group = store.fetch_group(&group_id).await?;
            let batch = settlements.settle_all(&group_id, &acting).await?;
            println!(
                "applied {} settlement(s), skipped {} (version {})",
                batch.applied.len(),
                batch.skipped.len(),
                batch.version
            );
            print_balances(&group, &batch.balances);
        }
    }

    Ok(())
}

fn print_balances(group: &Group, balances: &Balances) {
    for (member, amount) in balances.iter() {
        println!(
            "  {:<24} {:>14}",
            group.display_name(member),
            amount.format(&group.home_currency)
        );
    }
}
