use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::storage::{GiftCode, Plan, StorageError, Store};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 8;
const ISSUE_ATTEMPTS: usize = 8;

#[derive(Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

#[derive(Debug, PartialEq, Eq)]
pub enum RedeemOutcome {
    Upgraded(Plan),
    InvalidOrUsed,
}

/// Owns every admission decision the bot makes: the per-user cooldown on
/// image generation, the professional plan gate, the gift-code lifecycle and
/// the last-image tracker.
///
/// The cooldown and last-image maps are process-local and lost on restart.
/// Subscriptions and gift codes live in the store and are shared across
/// instances.
#[derive(Clone)]
pub struct EntitlementEngine {
    store: Arc<dyn Store>,
    cooldown: Duration,
    last_ai_use: Arc<DashMap<i64, Instant>>,
    last_images: Arc<DashMap<i64, String>>,
    active_batches: Arc<DashMap<i64, Arc<AtomicBool>>>,
}

impl EntitlementEngine {
    pub fn new(store: Arc<dyn Store>, cooldown: Duration) -> Self {
        Self {
            store,
            cooldown,
            last_ai_use: Arc::new(DashMap::new()),
            last_images: Arc::new(DashMap::new()),
            active_batches: Arc::new(DashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Single atomic check-and-set per user: the map entry holds its shard
    /// lock for the whole decision, so two interleaved calls cannot both
    /// read "no prior use" and pass.
    pub fn check_and_record_ai_use(&self, user_id: i64, now: Instant) -> RateDecision {
        match self.last_ai_use.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < self.cooldown {
                    RateDecision::Denied {
                        retry_after: self.cooldown - elapsed,
                    }
                } else {
                    entry.insert(now);
                    RateDecision::Allowed
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                RateDecision::Allowed
            }
        }
    }

    /// Uncached read so the gate reflects store state exactly at call time.
    pub async fn is_professional(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self
            .store
            .find_subscription(user_id)
            .await?
            .is_some_and(|sub| sub.plan == Plan::Professional))
    }

    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Issues a fresh unused code. Uniqueness is enforced at insert: a
    /// duplicate-key conflict retries with a new code instead of silently
    /// overwriting an unredeemed one.
    pub async fn issue_code(&self, plan: Plan) -> Result<String, StorageError> {
        for _ in 0..ISSUE_ATTEMPTS {
            let code = Self::generate_code();
            let inserted = self
                .store
                .insert_gift_code(&GiftCode { code: code.clone(), plan })
                .await?;
            if inserted {
                return Ok(code);
            }
            warn!("Gift code collision on {}, retrying", code);
        }
        Err(StorageError::Constraint(
            "could not allocate a unique gift code".to_string(),
        ))
    }

    /// Atomic find-and-delete; the deletion is what marks the code used, so
    /// exactly one of any number of concurrent redemptions succeeds.
    pub async fn redeem(&self, code: &str, user_id: i64) -> Result<RedeemOutcome, StorageError> {
        match self.store.take_gift_code(code).await? {
            Some(gift_code) => {
                self.store.upsert_subscription(user_id, gift_code.plan).await?;
                info!("User {} redeemed a {:?} gift code", user_id, gift_code.plan);
                Ok(RedeemOutcome::Upgraded(gift_code.plan))
            }
            None => Ok(RedeemOutcome::InvalidOrUsed),
        }
    }

    pub fn record_last_image(&self, user_id: i64, url: String) {
        self.last_images.insert(user_id, url);
    }

    pub fn last_image(&self, user_id: i64) -> Option<String> {
        self.last_images.get(&user_id).map(|e| e.value().clone())
    }

    /// Claims the one batch slot a user gets. If a batch is already running
    /// for this user, its cancel flag is raised instead and `None` comes
    /// back, so a repeated /proai cancels the batch in flight.
    pub fn begin_batch(&self, user_id: i64) -> Option<BatchGuard> {
        match self.active_batches.entry(user_id) {
            Entry::Occupied(entry) => {
                entry.get().store(true, Ordering::Relaxed);
                None
            }
            Entry::Vacant(entry) => {
                let flag = Arc::new(AtomicBool::new(false));
                entry.insert(Arc::clone(&flag));
                Some(BatchGuard {
                    user_id,
                    flag,
                    slots: Arc::clone(&self.active_batches),
                })
            }
        }
    }
}

/// Releases the user's batch slot on drop.
pub struct BatchGuard {
    user_id: i64,
    flag: Arc<AtomicBool>,
    slots: Arc<DashMap<i64, Arc<AtomicBool>>>,
}

impl BatchGuard {
    pub fn cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.slots.remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn engine() -> EntitlementEngine {
        EntitlementEngine::new(Arc::new(MemoryStore::new()), Duration::from_secs(5))
    }

    #[test]
    fn generated_codes_are_eight_uppercase_alphanumerics() {
        for _ in 0..100 {
            let code = EntitlementEngine::generate_code();
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn cooldown_denies_within_window_and_allows_after() {
        let engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.check_and_record_ai_use(1, t0), RateDecision::Allowed);

        match engine.check_and_record_ai_use(1, t0 + Duration::from_secs(3)) {
            RateDecision::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(2)),
            other => panic!("expected denial, got {:?}", other),
        }

        assert_eq!(
            engine.check_and_record_ai_use(1, t0 + Duration::from_secs(5)),
            RateDecision::Allowed
        );
    }

    #[test]
    fn denied_use_does_not_extend_the_cooldown() {
        let engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.check_and_record_ai_use(1, t0), RateDecision::Allowed);
        // Denied at t0+4s; the window still counts from t0.
        assert!(matches!(
            engine.check_and_record_ai_use(1, t0 + Duration::from_secs(4)),
            RateDecision::Denied { .. }
        ));
        assert_eq!(
            engine.check_and_record_ai_use(1, t0 + Duration::from_secs(5)),
            RateDecision::Allowed
        );
    }

    #[test]
    fn cooldown_is_tracked_per_user() {
        let engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.check_and_record_ai_use(1, t0), RateDecision::Allowed);
        assert_eq!(engine.check_and_record_ai_use(2, t0), RateDecision::Allowed);
    }

    #[tokio::test]
    async fn issued_code_redeems_once_then_reports_invalid() {
        let engine = engine();
        let code = engine.issue_code(Plan::Professional).await.unwrap();

        assert_eq!(
            engine.redeem(&code, 42).await.unwrap(),
            RedeemOutcome::Upgraded(Plan::Professional)
        );
        assert!(engine.is_professional(42).await.unwrap());

        assert_eq!(engine.redeem(&code, 43).await.unwrap(), RedeemOutcome::InvalidOrUsed);
        assert!(!engine.is_professional(43).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_redemptions_of_one_code_succeed_exactly_once() {
        let engine = engine();
        let code = engine.issue_code(Plan::Professional).await.unwrap();

        let (a, b) = tokio::join!(engine.redeem(&code, 1), engine.redeem(&code, 2));

        let outcomes = [a.unwrap(), b.unwrap()];
        let upgrades = outcomes
            .iter()
            .filter(|o| matches!(o, RedeemOutcome::Upgraded(_)))
            .count();
        assert_eq!(upgrades, 1);
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let engine = engine();
        assert_eq!(
            engine.redeem("NOTACODE", 1).await.unwrap(),
            RedeemOutcome::InvalidOrUsed
        );
    }

    #[test]
    fn last_image_is_last_write_wins() {
        let engine = engine();
        assert_eq!(engine.last_image(1), None);

        engine.record_last_image(1, "https://img/one.png".to_string());
        engine.record_last_image(1, "https://img/two.png".to_string());

        assert_eq!(engine.last_image(1).as_deref(), Some("https://img/two.png"));
    }

    #[test]
    fn second_batch_request_cancels_the_running_batch() {
        let engine = engine();

        let guard = engine.begin_batch(1).expect("slot should be free");
        assert!(!guard.cancelled());

        assert!(engine.begin_batch(1).is_none());
        assert!(guard.cancelled());

        drop(guard);
        assert!(engine.begin_batch(1).is_some());
    }
}
