use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    events::TeardownReason,
    player::{GuildBinding, GuildPlayer, PlayerSettings},
};

/// Mapa guild → reproductor compartido por todos los comandos.
///
/// Creation goes through the DashMap entry API, so two first-time requests
/// for the same guild race on one shard lock and exactly one player is built.
/// No shard lock is ever held across an `.await`.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    created: AtomicU64,
    settings: PlayerSettings,
    root: CancellationToken,
}

impl PlayerRegistry {
    pub fn new(settings: PlayerSettings) -> Arc<Self> {
        Arc::new(Self {
            players: DashMap::new(),
            created: AtomicU64::new(0),
            settings,
            root: CancellationToken::new(),
        })
    }

    /// Devuelve el reproductor del guild o crea uno nuevo.
    ///
    /// `binding` is only invoked when a player is actually created.
    pub fn get_or_create<F>(self: &Arc<Self>, guild_id: GuildId, binding: F) -> Arc<GuildPlayer>
    where
        F: FnOnce() -> GuildBinding,
    {
        let (player, created) = match self.players.entry(guild_id) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                let player = GuildPlayer::new(
                    serial,
                    guild_id,
                    self.settings.clone(),
                    binding(),
                    self.root.child_token(),
                    Arc::downgrade(self),
                );
                entry.insert(player.clone());
                (player, true)
            }
        };

        if created {
            info!("🆕 Reproductor #{} creado para guild {}", player.serial(), guild_id);
            player.start();
        }
        player
    }

    pub fn lookup(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Quita el reproductor del mapa sin cerrarlo. Idempotente.
    #[allow(dead_code)]
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    /// Quita la entrada solo si sigue siendo el mismo reproductor.
    pub(crate) fn evict(&self, guild_id: GuildId, serial: u64) {
        self.players
            .remove_if(&guild_id, |_, player| player.serial() == serial);
    }

    /// Cierra el reproductor del guild. `false` si no había ninguno.
    pub async fn close(&self, guild_id: GuildId, reason: TeardownReason) -> bool {
        match self.lookup(guild_id) {
            Some(player) => {
                player.close(reason).await;
                true
            }
            None => false,
        }
    }

    /// Apaga todos los reproductores y espera sus limpiezas.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let players: Vec<_> = self
            .players
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("🛑 Cerrando {} reproductores", players.len());
        join_all(
            players
                .iter()
                .map(|player| player.close(TeardownReason::Shutdown)),
        )
        .await;
    }

    /// Total de reproductores creados desde el arranque.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            events::PlayerEvents,
            player::PlayerState,
            signal::TrackEnd,
            testing::{guild, settings, track, wait_until, FakeVoice, Journal, RecordingEvents},
            track::TrackInfo,
        },
        error::PlayerGone,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Presentación que revienta al terminar una pista.
    struct BrokenEvents;

    #[async_trait]
    impl PlayerEvents for BrokenEvents {
        async fn track_started(&self, _guild_id: GuildId, _track: &TrackInfo) {}

        async fn track_ended(&self, _guild_id: GuildId, _track: &TrackInfo, _cause: &TrackEnd) {
            panic!("la presentación falló");
        }

        async fn player_closed(&self, _guild_id: GuildId, _reason: TeardownReason) {}
    }

    fn binding(journal: &Journal) -> impl FnOnce() -> GuildBinding {
        let voice = FakeVoice::new(journal);
        let events = RecordingEvents::new(journal);
        move || GuildBinding { voice, events }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_create_one_player() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let journal = journal.clone();
                tokio::spawn(async move { registry.get_or_create(guild(1), binding(&journal)).serial() })
            })
            .collect();

        let serials: Vec<u64> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(registry.created_count(), 1);
        assert_eq!(registry.len(), 1);
        assert!(serials.iter().all(|&s| s == 1));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn factory_runs_only_on_creation() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        let mut calls = 0;

        registry.get_or_create(guild(1), || {
            calls += 1;
            binding(&journal)()
        });
        registry.get_or_create(guild(1), || {
            calls += 1;
            binding(&journal)()
        });

        assert_eq!(calls, 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn guilds_are_independent() {
        let registry = PlayerRegistry::new(settings());
        let one = Journal::default();
        let two = Journal::default();
        let voice_one = FakeVoice::new(&one);
        let voice_two = FakeVoice::new(&two);
        let events_one = RecordingEvents::new(&one);
        let events_two = RecordingEvents::new(&two);

        let a = registry.get_or_create(guild(1), || GuildBinding {
            voice: voice_one.clone(),
            events: events_one,
        });
        let b = registry.get_or_create(guild(2), || GuildBinding {
            voice: voice_two.clone(),
            events: events_two,
        });
        a.enqueue(track("a1", &one)).unwrap();
        a.enqueue(track("a2", &one)).unwrap();
        b.enqueue(track("b1", &two)).unwrap();
        b.enqueue(track("b2", &two)).unwrap();
        wait_until(|| one.count("play:") == 1 && two.count("play:") == 1).await;

        // skip en el guild 1
        assert!(a.skip());
        wait_until(|| one.count("play:a2") == 1).await;

        let other = b.snapshot();
        assert_eq!(other.state, PlayerState::Playing);
        assert_eq!(other.current.unwrap().title, "b1");
        assert_eq!(other.queued, 1);
        assert_eq!(two.count("stop"), 0);

        // el guild 2 se vacía y vence por inactividad
        voice_two.finish_current();
        wait_until(|| two.count("play:b2") == 1).await;
        voice_two.finish_current();
        wait_until(|| b.state() == PlayerState::Idle).await;
        tokio::time::sleep(Duration::from_secs(301)).await;
        wait_until(|| registry.lookup(guild(2)).is_none()).await;

        let survivor = registry.lookup(guild(1)).expect("guild 1 sigue activo");
        let snap = survivor.snapshot();
        assert_eq!(snap.state, PlayerState::Playing);
        assert_eq!(snap.current.unwrap().title, "a2");
        assert_eq!(snap.queued, 0);
        assert_eq!(one.count("disconnect"), 0);
        assert_eq!(two.count("closed:IdleTimeout"), 1);

        assert!(registry.close(guild(1), TeardownReason::Disconnected).await);
        assert!(registry.is_empty());
        assert_eq!(registry.created_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_disconnect_still_frees_the_guild() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        let voice = FakeVoice::new(&journal);
        voice.slow_disconnect(Duration::from_secs(30));
        let events = RecordingEvents::new(&journal);
        let player = registry.get_or_create(guild(6), || GuildBinding {
            voice: voice.clone(),
            events,
        });
        player.enqueue(track("A", &journal)).unwrap();
        wait_until(|| voice.is_playing()).await;

        assert!(registry.close(guild(6), TeardownReason::Disconnected).await);

        assert!(registry.lookup(guild(6)).is_none());
        wait_until(|| player.is_closed()).await;
        assert_eq!(journal.count("closed:Disconnected"), 1);

        let next = registry.get_or_create(guild(6), binding(&journal));
        assert_eq!(next.serial(), 2);
        assert!(next.enqueue(track("B", &journal)).is_ok());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_presenter_does_not_strand_the_guild() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        let voice = FakeVoice::new(&journal);
        let player = registry.get_or_create(guild(7), || GuildBinding {
            voice: voice.clone(),
            events: Arc::new(BrokenEvents),
        });
        player.enqueue(track("A", &journal)).unwrap();
        wait_until(|| voice.is_playing()).await;

        voice.finish_current();

        wait_until(|| registry.lookup(guild(7)).is_none()).await;
        wait_until(|| journal.count("disconnect") == 1).await;
        assert!(matches!(
            player.enqueue(track("B", &journal)),
            Err(PlayerGone(_))
        ));

        let next = registry.get_or_create(guild(7), binding(&journal));
        assert_eq!(next.serial(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        registry.get_or_create(guild(3), binding(&journal));

        assert!(registry.remove(guild(3)).is_some());
        assert!(registry.remove(guild(3)).is_none());
        assert!(registry.is_empty());
        assert!(!registry.close(guild(3), TeardownReason::Disconnected).await);
    }

    #[tokio::test]
    async fn dying_player_does_not_evict_its_successor() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        let old = registry.get_or_create(guild(4), binding(&journal));
        registry.remove(guild(4));
        let new = registry.get_or_create(guild(4), binding(&journal));

        old.close(TeardownReason::Disconnected).await;

        let current = registry.lookup(guild(4)).expect("el sucesor sigue registrado");
        assert_eq!(current.serial(), new.serial());
        assert_eq!(registry.created_count(), 2);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_players_leave_the_registry() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        registry.get_or_create(guild(5), binding(&journal));

        tokio::time::sleep(Duration::from_secs(301)).await;
        wait_until(|| registry.lookup(guild(5)).is_none()).await;

        assert_eq!(journal.entries(), vec!["disconnect", "closed:IdleTimeout"]);
    }

    #[tokio::test]
    async fn shutdown_closes_every_player() {
        let registry = PlayerRegistry::new(settings());
        let journal = Journal::default();
        for id in 1..=3 {
            let player = registry.get_or_create(guild(id), binding(&journal));
            player.enqueue(track(&format!("t{id}"), &journal)).unwrap();
        }

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert_eq!(journal.count("closed:Shutdown"), 3);
        assert_eq!(journal.count("release:"), 3);
    }
}
