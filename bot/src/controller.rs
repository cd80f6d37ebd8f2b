use crate::session::Session;
use crate::source::PriceSource;
use discord::GuildId;
use futures::future;
use std::time::Duration;
use tokio::sync::watch;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Display surfaces owned by the controller.
///
/// `price` and `status` only ever hold values from the most recent
/// successful fetch; a failed fetch leaves them untouched, so an outage
/// shows the last known good state instead of an error. `guilds` is
/// recomputed from the live session at the start of every cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub price: String,
    pub status: String,
    pub guilds: Vec<GuildId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    AwaitingReady,
    Running,
    Stopped,
}

/// Periodic task keeping the bot's displayed identity in sync with the
/// marketplace floor price.
///
/// One fetch-then-update cycle runs per minute, and cycles never overlap
/// since the whole timeline lives on one task. Within a cycle the global
/// presence update is issued before the per-guild nickname fan-out; the
/// fan-out itself runs concurrently and one guild failing never cancels
/// its siblings.
pub struct RefreshController<S, P> {
    session: S,
    source: P,
    alias: String,
    state: DisplayState,
    phase: Phase,
}

impl<S: Session, P: PriceSource> RefreshController<S, P> {
    pub fn new(session: S, source: P, alias: String) -> Self {
        Self {
            session,
            source,
            alias,
            state: DisplayState::default(),
            phase: Phase::AwaitingReady,
        }
    }

    /// Drives the controller until `shutdown` flips, blocking on session
    /// readiness before the first cycle.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(REFRESH_INTERVAL);

        loop {
            match self.phase {
                Phase::AwaitingReady => {
                    self.session.wait_until_ready().await;
                    self.state.guilds = self.session.guild_ids().await;
                    log::info!(
                        "[{}] Bot started successfully, active on {} servers",
                        self.alias,
                        self.state.guilds.len()
                    );
                    self.phase = Phase::Running;
                }
                Phase::Running => {
                    tokio::select! {
                        _ = interval.tick() => self.tick().await,
                        _ = shutdown.changed() => self.phase = Phase::Stopped,
                    }
                }
                Phase::Stopped => {
                    log::info!("[{}] Refresh loop stopped", self.alias);
                    return;
                }
            }
        }
    }

    /// One refresh cycle: recompute membership, fetch, then mirror the
    /// quote to the presence and every guild nickname. A failed fetch skips
    /// the rest of the cycle.
    async fn tick(&mut self) {
        self.state.guilds = self.session.guild_ids().await;

        let Some(quote) = self.source.latest_quote().await else {
            return;
        };

        self.state.price = quote.price;
        self.state.status = format!("{} floor price on {}", quote.project, quote.source);

        if let Err(e) = self.session.update_presence(&self.state.status).await {
            log::error!("[{}] Failed to update presence: {e}", self.alias);
        }

        future::join_all(
            self.state
                .guilds
                .iter()
                .map(|guild_id| self.update_guild(guild_id)),
        )
        .await;
    }

    async fn update_guild(&self, guild_id: &GuildId) {
        match self
            .session
            .update_nickname(guild_id, &self.state.price)
            .await
        {
            Ok(()) => log::info!(
                "[{guild_id}] [{}] Nickname: {} Activity: {}",
                self.alias,
                self.state.price,
                self.state.status
            ),
            Err(e) => log::error!(
                "[{guild_id}] [{}] Failed to update nickname: {e}",
                self.alias
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use opensea::FloorPriceQuote;
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    enum Update {
        Presence(String),
        Nickname(GuildId, String),
    }

    #[derive(Default)]
    struct StubSession {
        guilds: Mutex<Vec<GuildId>>,
        failing: HashSet<GuildId>,
        updates: Mutex<Vec<Update>>,
    }

    impl StubSession {
        fn with_guilds(ids: &[&str]) -> Arc<Self> {
            let session = Self::default();
            *session.guilds.lock().unwrap() = ids.iter().map(|id| GuildId::from(*id)).collect();
            Arc::new(session)
        }

        fn updates(&self) -> Vec<Update> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Session for Arc<StubSession> {
        async fn wait_until_ready(&self) {}

        async fn guild_ids(&self) -> Vec<GuildId> {
            self.guilds.lock().unwrap().clone()
        }

        async fn update_presence(&self, activity: &str) -> anyhow::Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push(Update::Presence(activity.to_string()));
            Ok(())
        }

        async fn update_nickname(&self, guild_id: &GuildId, nick: &str) -> anyhow::Result<()> {
            if self.failing.contains(guild_id) {
                return Err(anyhow!("Missing permissions"));
            }
            self.updates
                .lock()
                .unwrap()
                .push(Update::Nickname(guild_id.clone(), nick.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubSource {
        quotes: Mutex<VecDeque<Option<FloorPriceQuote>>>,
    }

    impl StubSource {
        fn with_quotes(quotes: Vec<Option<FloorPriceQuote>>) -> Arc<Self> {
            Arc::new(Self {
                quotes: Mutex::new(quotes.into()),
            })
        }
    }

    #[async_trait]
    impl PriceSource for Arc<StubSource> {
        async fn latest_quote(&self) -> Option<FloorPriceQuote> {
            self.quotes.lock().unwrap().pop_front().flatten()
        }
    }

    fn quote(price: &str) -> FloorPriceQuote {
        FloorPriceQuote {
            source: "OpenSea".to_string(),
            price: price.to_string(),
            project: "BAYC".to_string(),
        }
    }

    fn controller(
        session: &Arc<StubSession>,
        source: &Arc<StubSource>,
    ) -> RefreshController<Arc<StubSession>, Arc<StubSource>> {
        RefreshController::new(Arc::clone(session), Arc::clone(source), "BAYC".to_string())
    }

    #[tokio::test]
    async fn tick_mirrors_quote_to_all_surfaces() {
        let session = StubSession::with_guilds(&["100", "200"]);
        let source = StubSource::with_quotes(vec![Some(quote("35.5 ETH"))]);
        let mut controller = controller(&session, &source);

        controller.tick().await;

        assert_eq!(controller.state.price, "35.5 ETH");
        assert_eq!(controller.state.status, "BAYC floor price on OpenSea");

        let updates = session.updates();
        assert_eq!(updates.len(), 3);
        // The presence update happens before any nickname write
        assert_eq!(
            updates[0],
            Update::Presence("BAYC floor price on OpenSea".to_string())
        );
        assert!(updates.contains(&Update::Nickname(
            GuildId::from("100"),
            "35.5 ETH".to_string()
        )));
        assert!(updates.contains(&Update::Nickname(
            GuildId::from("200"),
            "35.5 ETH".to_string()
        )));
    }

    #[tokio::test]
    async fn failed_fetch_preserves_display_state() {
        let session = StubSession::with_guilds(&["100"]);
        let source = StubSource::with_quotes(vec![Some(quote("35.5 ETH")), None]);
        let mut controller = controller(&session, &source);

        controller.tick().await;
        let before = controller.state.clone();
        let updates_before = session.updates().len();

        controller.tick().await;

        assert_eq!(controller.state, before);
        assert_eq!(session.updates().len(), updates_before);
    }

    #[tokio::test]
    async fn repeated_ticks_with_same_quote_are_idempotent() {
        let session = StubSession::with_guilds(&["100"]);
        let source =
            StubSource::with_quotes(vec![Some(quote("35.5 ETH")), Some(quote("35.5 ETH"))]);
        let mut controller = controller(&session, &source);

        controller.tick().await;
        let first = controller.state.clone();
        controller.tick().await;

        assert_eq!(controller.state, first);
    }

    #[tokio::test]
    async fn failing_guild_does_not_abort_siblings() {
        let mut session = StubSession::default();
        session.failing.insert(GuildId::from("100"));
        *session.guilds.lock().unwrap() = vec![GuildId::from("100"), GuildId::from("200")];
        let session = Arc::new(session);
        let source = StubSource::with_quotes(vec![Some(quote("35.5 ETH"))]);
        let mut controller = controller(&session, &source);

        controller.tick().await;

        let updates = session.updates();
        assert!(updates.contains(&Update::Nickname(
            GuildId::from("200"),
            "35.5 ETH".to_string()
        )));
        assert!(!updates
            .iter()
            .any(|update| matches!(update, Update::Nickname(id, _) if id == &GuildId::from("100"))));
    }

    #[tokio::test]
    async fn membership_is_recomputed_every_tick() {
        let session = StubSession::with_guilds(&["1", "2", "3"]);
        let source = StubSource::with_quotes(vec![Some(quote("35.5 ETH")), Some(quote("36 ETH"))]);
        let mut controller = controller(&session, &source);

        controller.tick().await;
        assert_eq!(controller.state.guilds.len(), 3);

        session.guilds.lock().unwrap().push(GuildId::from("4"));
        controller.tick().await;

        assert_eq!(controller.state.guilds.len(), 4);
        assert!(session
            .updates()
            .contains(&Update::Nickname(GuildId::from("4"), "36 ETH".to_string())));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let session = StubSession::with_guilds(&[]);
        let source = StubSource::with_quotes(vec![]);
        let controller = controller(&session, &source);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(controller.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop")
            .unwrap();
    }
}
