use std::sync::Arc;

use teloxide::Bot;

use tjr_core::{
    accounts::AccountBook,
    bridge::BridgeConnector,
    config::Config,
    dispatcher::Dispatcher,
    ledger::Ledger,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    session::SessionRegistry,
    tokens::TokenIssuer,
};
use tjr_telegram::{router::AppState, TelegramMessenger};
use tjr_xmpp::XmppTransport;

#[tokio::main]
async fn main() -> Result<(), tjr_core::Error> {
    let cfg = Config::load();
    tjr_core::logging::init("tjr", cfg.as_ref().map(|c| c.log_json).unwrap_or(false))?;
    let cfg = cfg.inspect_err(|e| tracing::error!(error = %e, "refusing to start"))?;

    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Keep a 429 RetryAfter retry in the adapter; throttling only reduces how often we hit it.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let accounts = Arc::new(AccountBook::new(cfg.users.clone(), cfg.admins.clone()));
    let ledger = Arc::new(Ledger::new(accounts.opening_balances()));
    let tokens = Arc::new(TokenIssuer::new(ledger.clone(), cfg.token_ttl));
    let connector = Arc::new(BridgeConnector::new(
        Arc::new(XmppTransport::new()),
        messenger.clone(),
        cfg.xmpp_host.clone(),
        cfg.xmpp_port,
    ));
    let sessions = Arc::new(SessionRegistry::new(accounts.clone(), connector));
    let dispatcher = Arc::new(Dispatcher::new(
        accounts,
        ledger,
        tokens,
        sessions.clone(),
        Arc::new(cfg.catalog.clone()),
        messenger.clone(),
    ));

    tracing::info!(
        users = cfg.users.len(),
        admins = cfg.admins.len(),
        xmpp_host = %cfg.xmpp_host,
        xmpp_port = cfg.xmpp_port,
        "relay starting"
    );

    let state = Arc::new(AppState::new(dispatcher, messenger));
    let polled = tjr_telegram::router::run_polling(bot, state).await;

    sessions.shutdown().await;
    polled.map_err(|e| tjr_core::Error::External(format!("telegram bot failed: {e}")))?;

    tracing::info!("relay stopped");
    Ok(())
}
