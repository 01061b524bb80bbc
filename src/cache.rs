use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::gamelog::{PlayerGamelog, PlayerKind};

pub const DEFAULT_CAPACITY: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GamelogKey {
    pub player_id: String,
    pub kind: PlayerKind,
    pub season: u16,
}

impl GamelogKey {
    pub fn new(player_id: impl Into<String>, kind: PlayerKind, season: u16) -> Self {
        Self {
            player_id: player_id.into(),
            kind,
            season,
        }
    }
}

/// Which entry makes room when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Oldest insertion leaves first. Hits do not refresh an entry's position.
    #[default]
    Fifo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Size-bounded memo of player gamelogs, built once per run and handed to
/// whoever needs lookups. Not synchronised: callers serialise access.
#[derive(Debug)]
pub struct GamelogCache {
    capacity: usize,
    policy: EvictionPolicy,
    entries: HashMap<GamelogKey, PlayerGamelog>,
    order: VecDeque<GamelogKey>,
    stats: CacheStats,
}

impl Default for GamelogCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl GamelogCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, EvictionPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn get_or_fetch<F, E>(&mut self, key: &GamelogKey, fetch: F) -> Result<&PlayerGamelog, E>
    where
        F: FnOnce(&GamelogKey) -> Result<PlayerGamelog, E>,
    {
        if self.entries.contains_key(key) {
            self.stats.hits += 1;
            debug!(player_id = %key.player_id, kind = %key.kind, "gamelog cache hit");
            return Ok(&self.entries[key]);
        }

        self.stats.misses += 1;
        debug!(player_id = %key.player_id, kind = %key.kind, "gamelog cache miss");
        let gamelog = fetch(key)?;

        if self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.order.push_back(key.clone());
        self.entries.insert(key.clone(), gamelog);
        debug_assert!(self.entries.len() <= self.capacity);
        debug_assert_eq!(self.entries.len(), self.order.len());

        Ok(&self.entries[key])
    }

    fn evict_one(&mut self) {
        let victim = match self.policy {
            EvictionPolicy::Fifo => self.order.pop_front(),
        };
        if let Some(victim) = victim {
            debug!(player_id = %victim.player_id, kind = %victim.kind, "evicting gamelog");
            self.entries.remove(&victim);
            self.stats.evictions += 1;
        }
    }

    pub fn contains(&self, key: &GamelogKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn empty_log(key: &GamelogKey) -> PlayerGamelog {
        PlayerGamelog {
            player_id: key.player_id.clone(),
            kind: key.kind,
            season: key.season,
            rows: Vec::new(),
        }
    }

    fn key(id: usize) -> GamelogKey {
        GamelogKey::new(format!("player{id:02}"), PlayerKind::Batting, 2019)
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = GamelogCache::default();
        for id in 0..100 {
            cache
                .get_or_fetch(&key(id), |k| Ok::<_, ()>(empty_log(k)))
                .expect("fetch ok");
            assert!(cache.len() <= DEFAULT_CAPACITY);
        }
        assert_eq!(cache.len(), DEFAULT_CAPACITY);
        assert_eq!(cache.stats().evictions, 70);
    }

    #[test]
    fn hit_skips_fetch() {
        let calls = Cell::new(0);
        let mut cache = GamelogCache::new(4);
        let fetch = |k: &GamelogKey| {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(empty_log(k))
        };
        cache.get_or_fetch(&key(1), fetch).expect("miss");
        cache.get_or_fetch(&key(1), fetch).expect("hit");
        cache.get_or_fetch(&key(1), fetch).expect("hit");
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_oldest_insertion_first() {
        let mut cache = GamelogCache::new(2);
        for id in [1, 2] {
            cache
                .get_or_fetch(&key(id), |k| Ok::<_, ()>(empty_log(k)))
                .expect("fetch ok");
        }
        // A hit does not protect player01 from eviction.
        cache
            .get_or_fetch(&key(1), |k| Ok::<_, ()>(empty_log(k)))
            .expect("hit");
        cache
            .get_or_fetch(&key(3), |k| Ok::<_, ()>(empty_log(k)))
            .expect("fetch ok");
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn failed_fetch_is_not_cached() {
        let mut cache = GamelogCache::new(2);
        let res = cache.get_or_fetch(&key(1), |_| Err::<PlayerGamelog, _>("offline"));
        assert_eq!(res.err(), Some("offline"));
        assert!(cache.is_empty());
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut cache = GamelogCache::new(4);
        let bat = GamelogKey::new("ohtansh01", PlayerKind::Batting, 2019);
        let pitch = GamelogKey::new("ohtansh01", PlayerKind::Pitching, 2019);
        let kind = cache
            .get_or_fetch(&bat, |k| Ok::<_, ()>(empty_log(k)))
            .expect("fetch ok")
            .kind;
        assert_eq!(kind, PlayerKind::Batting);
        let kind = cache
            .get_or_fetch(&pitch, |k| Ok::<_, ()>(empty_log(k)))
            .expect("fetch ok")
            .kind;
        assert_eq!(kind, PlayerKind::Pitching);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(GamelogCache::new(0).capacity(), 1);
    }
}
