use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use omnichannel_intake::channels::{
    EmailAdapter, EmailTemplateAcknowledger, ImapMailSource, PollScheduler, SlackAcknowledger,
    SlackAdapter, SlackApi,
};
use omnichannel_intake::config::IntakeConfig;
use omnichannel_intake::pipeline::{
    Intake, IntakeFilter, MemoryQueue, NatsTransport, OutboundPublisher, QueueTransport,
};
use omnichannel_intake::routes::{IntakeRouteState, intake_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env().context("invalid configuration")?;

    // ── Queue ───────────────────────────────────────────────────────────
    let transport: Arc<dyn QueueTransport> = match &config.queue.nats_url {
        Some(url) => Arc::new(
            NatsTransport::connect(url)
                .await
                .with_context(|| format!("failed to connect to NATS at {url}"))?,
        ),
        None => {
            let queue = MemoryQueue::new();
            warn!(
                history = queue.capacity(),
                "NATS_URL not set, publishing to the in-memory queue"
            );
            queue
        }
    };
    let publisher = OutboundPublisher::new(transport, config.queue.queue_name.clone());

    let mut filter = IntakeFilter::default_rules();
    if let Some(mail) = &config.mail {
        filter = filter.with_own_address(&mail.mail_user);
    }
    let intake = Arc::new(Intake::new(filter, publisher));

    // ── Email ───────────────────────────────────────────────────────────
    let scheduler = match &config.mail {
        Some(mail) => {
            let adapter = Arc::new(EmailAdapter::new(
                Arc::new(ImapMailSource::new(mail.clone())),
                Arc::clone(&intake),
                Arc::new(EmailTemplateAcknowledger::default()),
            ));
            let scheduler = PollScheduler::new(adapter, mail.poll_interval());
            scheduler.start().await?;
            info!(host = %mail.mail_host, mailbox = %mail.mailbox, "Email channel enabled");
            Some(scheduler)
        }
        None => {
            info!("IMAP_SERVER not set, email channel disabled");
            None
        }
    };

    // ── Slack ───────────────────────────────────────────────────────────
    let slack = config.slack.as_ref().map(|slack| {
        let api = Arc::new(SlackApi::new(slack));
        let ack = Arc::new(SlackAcknowledger::new(api.clone(), slack.ack_text.clone()));
        info!("Slack channel enabled");
        Arc::new(SlackAdapter::new(api, Arc::clone(&intake), ack))
    });
    if slack.is_none() {
        info!("SLACK_BOT_TOKEN not set, Slack channel disabled");
    }

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = intake_routes(IntakeRouteState { slack });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(
        addr = %config.server.bind_addr,
        queue = %config.queue.queue_name,
        "Omnichannel intake listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
        .context("HTTP server failed")?;

    if let Some(scheduler) = scheduler {
        info!("Waiting for the in-flight email cycle");
        scheduler.stop().await;
    }
    info!("Shutdown complete");
    Ok(())
}
