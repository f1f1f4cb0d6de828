use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::OtpConfig;
use crate::types::{EmailAddr, Purpose};

/// A pending verification challenge: the expected code plus accounting.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub code: String,
    pub purpose: Purpose,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub attempts: u32,
}

/// Proof that a challenge was solved. Consumed by exactly one
/// privileged action.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// Never issued, already consumed, or already evicted.
    NotFound,
    Expired,
    TooManyAttempts,
    InvalidCode { remaining: u32 },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("OTP not found. Please request a new OTP."),
            Self::Expired => f.write_str("OTP has expired. Please request a new OTP."),
            Self::TooManyAttempts => {
                f.write_str("Too many failed attempts. Please request a new OTP.")
            }
            Self::InvalidCode { remaining } => {
                write!(f, "Invalid OTP. {remaining} attempts remaining.")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    NotVerified,
    VerificationExpired,
}

impl std::fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotVerified => f.write_str("OTP not verified. Please verify OTP first."),
            Self::VerificationExpired => {
                f.write_str("Verification expired. Please request a new OTP.")
            }
        }
    }
}

/// Entries evicted by a single sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: usize,
    pub tickets: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.challenges + self.tickets
    }
}

#[derive(Debug, Default)]
struct Inner {
    challenges: HashMap<EmailAddr, Challenge>,
    tickets: HashMap<EmailAddr, Ticket>,
}

/// In-memory store for pending challenges and verification tickets.
///
/// Owned by the service instance rather than living in a process global, so
/// tests and multi-instance deployments can each hold their own. A single
/// lock covers both maps: the attempt counter update and the
/// challenge-delete/ticket-insert handoff on success must not interleave
/// with another writer for the same email.
#[derive(Debug, Clone)]
pub struct OtpStore {
    config: OtpConfig,
    inner: Arc<RwLock<Inner>>,
}

impl OtpStore {
    pub fn new(config: OtpConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Creates a fresh challenge for the email, superseding any prior one.
    /// Returns the generated code; delivering it is the caller's concern.
    pub async fn issue(&self, email: &EmailAddr, purpose: Purpose) -> String {
        self.issue_at(email, purpose, Timestamp::now()).await
    }

    pub(crate) async fn issue_at(
        &self,
        email: &EmailAddr,
        purpose: Purpose,
        now: Timestamp,
    ) -> String {
        let code = generate_code();

        let challenge = Challenge {
            code: code.clone(),
            purpose,
            created_at: now,
            expires_at: now + self.config.code_ttl,
            attempts: 0,
        };

        let mut inner = self.inner.write().await;
        if inner.challenges.insert(email.clone(), challenge).is_some() {
            debug!(email = %email, "superseded previous challenge");
        }

        code
    }

    /// Checks a submitted code against the pending challenge.
    /// On success the challenge is removed and a ticket is issued, so a
    /// given challenge can succeed at most once.
    pub async fn verify(&self, email: &EmailAddr, submitted: &str) -> Result<(), VerifyError> {
        self.verify_at(email, submitted, Timestamp::now()).await
    }

    pub(crate) async fn verify_at(
        &self,
        email: &EmailAddr,
        submitted: &str,
        now: Timestamp,
    ) -> Result<(), VerifyError> {
        let mut inner = self.inner.write().await;

        let challenge = inner
            .challenges
            .get_mut(email)
            .ok_or(VerifyError::NotFound)?;

        if now > challenge.expires_at {
            inner.challenges.remove(email);
            return Err(VerifyError::Expired);
        }

        // Attempt limit wins over a matching code: the 4th submission is
        // rejected on count alone.
        if challenge.attempts >= self.config.max_attempts {
            inner.challenges.remove(email);
            return Err(VerifyError::TooManyAttempts);
        }

        if challenge.code != submitted {
            challenge.attempts += 1;
            let remaining = self.config.max_attempts.saturating_sub(challenge.attempts);
            return Err(VerifyError::InvalidCode { remaining });
        }

        inner.challenges.remove(email);
        inner.tickets.insert(
            email.clone(),
            Ticket {
                issued_at: now,
                expires_at: now + self.config.ticket_ttl,
            },
        );

        Ok(())
    }

    /// Redeems the verification ticket for the email. Single use: the
    /// ticket is removed whether or not the follow-up action succeeds.
    pub async fn consume(&self, email: &EmailAddr) -> Result<(), ConsumeError> {
        self.consume_at(email, Timestamp::now()).await
    }

    pub(crate) async fn consume_at(
        &self,
        email: &EmailAddr,
        now: Timestamp,
    ) -> Result<(), ConsumeError> {
        let mut inner = self.inner.write().await;

        let ticket = inner.tickets.get(email).ok_or(ConsumeError::NotVerified)?;

        if now > ticket.expires_at {
            inner.tickets.remove(email);
            return Err(ConsumeError::VerificationExpired);
        }

        inner.tickets.remove(email);
        Ok(())
    }

    /// Evicts every expired entry from both maps. Best effort memory
    /// reclamation; `verify` and `consume` check expiry on access anyway.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Timestamp::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: Timestamp) -> SweepReport {
        let mut inner = self.inner.write().await;

        let before_challenges = inner.challenges.len();
        inner.challenges.retain(|_, c| now <= c.expires_at);
        let challenges = before_challenges - inner.challenges.len();

        let before_tickets = inner.tickets.len();
        inner.tickets.retain(|_, t| now <= t.expires_at);
        let tickets = before_tickets - inner.tickets.len();

        SweepReport {
            challenges,
            tickets,
        }
    }
}

/// Uniform 6-digit code, fixed width.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
impl OtpStore {
    pub(crate) async fn challenge(&self, email: &EmailAddr) -> Option<Challenge> {
        self.inner.read().await.challenges.get(email).cloned()
    }

    pub(crate) async fn ticket(&self, email: &EmailAddr) -> Option<Ticket> {
        self.inner.read().await.tickets.get(email).cloned()
    }

    pub(crate) async fn challenge_count(&self) -> usize {
        self.inner.read().await.challenges.len()
    }

    pub(crate) async fn ticket_count(&self) -> usize {
        self.inner.read().await.tickets.len()
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;

    fn test_store() -> OtpStore {
        OtpStore::new(OtpConfig::default())
    }

    fn email(raw: &str) -> EmailAddr {
        EmailAddr::new(raw)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }

    #[tokio::test]
    async fn issue_creates_single_challenge_with_zero_attempts() {
        let store = test_store();
        let addr = email("a@x.com");
        let now = Timestamp::now();

        let code = store
            .issue_at(&addr, Purpose::Registration, now)
            .await;

        assert_eq!(store.challenge_count().await, 1);
        let challenge = store.challenge(&addr).await.unwrap();
        assert_eq!(challenge.code, code);
        assert_eq!(challenge.attempts, 0);
        assert_eq!(challenge.created_at, now);
        assert_eq!(challenge.expires_at, now + SignedDuration::from_mins(5));
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_code() {
        let store = test_store();
        let addr = email("a@x.com");

        let old_code = store.issue(&addr, Purpose::Registration).await;
        let new_code = store.issue(&addr, Purpose::Registration).await;

        assert_eq!(store.challenge_count().await, 1);

        if old_code != new_code {
            let err = store.verify(&addr, &old_code).await.unwrap_err();
            assert_eq!(err, VerifyError::InvalidCode { remaining: 2 });
        }

        store.verify(&addr, &new_code).await.unwrap();
    }

    #[tokio::test]
    async fn verify_unknown_email_reports_not_found() {
        let store = test_store();

        let err = store.verify(&email("nobody@x.com"), "123456").await;

        assert_eq!(err.unwrap_err(), VerifyError::NotFound);
    }

    #[tokio::test]
    async fn correct_code_after_expiry_reports_expired_then_not_found() {
        let store = test_store();
        let addr = email("a@x.com");
        let now = Timestamp::now();

        let code = store.issue_at(&addr, Purpose::Reset, now).await;

        let later = now + SignedDuration::from_mins(6);
        let err = store.verify_at(&addr, &code, later).await.unwrap_err();
        assert_eq!(err, VerifyError::Expired);

        // The record was evicted on the expired check.
        let err = store.verify_at(&addr, &code, later).await.unwrap_err();
        assert_eq!(err, VerifyError::NotFound);
    }

    #[tokio::test]
    async fn three_wrong_submissions_count_down_then_lock_out() {
        let store = test_store();
        let addr = email("a@x.com");

        let code = store.issue(&addr, Purpose::Registration).await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for remaining in [2, 1, 0] {
            let err = store.verify(&addr, wrong).await.unwrap_err();
            assert_eq!(err, VerifyError::InvalidCode { remaining });
        }

        // Fourth submission is rejected on count even with the right code.
        let err = store.verify(&addr, &code).await.unwrap_err();
        assert_eq!(err, VerifyError::TooManyAttempts);

        // And the lock-out evicted the record.
        let err = store.verify(&addr, &code).await.unwrap_err();
        assert_eq!(err, VerifyError::NotFound);
    }

    #[tokio::test]
    async fn successful_verification_cannot_be_replayed() {
        let store = test_store();
        let addr = email("a@x.com");

        let code = store.issue(&addr, Purpose::Registration).await;

        store.verify(&addr, &code).await.unwrap();

        let err = store.verify(&addr, &code).await.unwrap_err();
        assert_eq!(err, VerifyError::NotFound);
    }

    #[tokio::test]
    async fn solving_a_challenge_issues_a_ticket_with_its_own_ttl() {
        let store = test_store();
        let addr = email("a@x.com");
        let now = Timestamp::now();

        let code = store.issue_at(&addr, Purpose::Reset, now).await;

        // Solve at the edge of the challenge window; the ticket's clock
        // starts at the solve, not at issuance.
        let solved_at = now + SignedDuration::from_mins(4);
        store.verify_at(&addr, &code, solved_at).await.unwrap();

        let ticket = store.ticket(&addr).await.unwrap();
        assert_eq!(ticket.issued_at, solved_at);
        assert_eq!(ticket.expires_at, solved_at + SignedDuration::from_mins(5));
    }

    #[tokio::test]
    async fn ticket_is_consumed_exactly_once() {
        let store = test_store();
        let addr = email("a@x.com");

        let code = store.issue(&addr, Purpose::Reset).await;
        store.verify(&addr, &code).await.unwrap();

        store.consume(&addr).await.unwrap();

        let err = store.consume(&addr).await.unwrap_err();
        assert_eq!(err, ConsumeError::NotVerified);
    }

    #[tokio::test]
    async fn consume_without_verification_reports_not_verified() {
        let store = test_store();

        let err = store.consume(&email("a@x.com")).await.unwrap_err();

        assert_eq!(err, ConsumeError::NotVerified);
    }

    #[tokio::test]
    async fn expired_ticket_reports_expired_then_not_verified() {
        let store = test_store();
        let addr = email("a@x.com");
        let now = Timestamp::now();

        let code = store.issue_at(&addr, Purpose::Reset, now).await;
        store.verify_at(&addr, &code, now).await.unwrap();

        let later = now + SignedDuration::from_mins(6);
        let err = store.consume_at(&addr, later).await.unwrap_err();
        assert_eq!(err, ConsumeError::VerificationExpired);

        let err = store.consume_at(&addr, later).await.unwrap_err();
        assert_eq!(err, ConsumeError::NotVerified);
    }

    #[tokio::test]
    async fn email_matching_is_case_insensitive() {
        let store = test_store();

        let code = store
            .issue(&email("a@x.com"), Purpose::Reset)
            .await;

        store.verify(&email("A@X.com"), &code).await.unwrap();
        store.consume(&email(" a@X.COM ")).await.unwrap();

        let err = store.consume(&email("a@x.com")).await.unwrap_err();
        assert_eq!(err, ConsumeError::NotVerified);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_entries_from_both_maps() {
        let store = test_store();
        let now = Timestamp::now();

        let stale = email("stale@x.com");
        let fresh = email("fresh@x.com");
        let solved = email("solved@x.com");

        store.issue_at(&stale, Purpose::Registration, now).await;
        let code = store.issue_at(&solved, Purpose::Reset, now).await;
        store.verify_at(&solved, &code, now).await.unwrap();

        let later = now + SignedDuration::from_mins(6);
        store.issue_at(&fresh, Purpose::Registration, later).await;

        // Access-time expiry agrees with the sweep before it runs.
        let err = store.verify_at(&stale, "123456", later).await.unwrap_err();
        assert_eq!(err, VerifyError::Expired);
        store.issue_at(&stale, Purpose::Registration, now).await;

        let report = store.sweep_at(later).await;

        assert_eq!(report.challenges, 1);
        assert_eq!(report.tickets, 1);
        assert_eq!(store.challenge_count().await, 1);
        assert_eq!(store.ticket_count().await, 0);
        assert!(store.challenge(&fresh).await.is_some());

        let err = store.verify_at(&stale, "123456", later).await.unwrap_err();
        assert_eq!(err, VerifyError::NotFound);
    }

    #[tokio::test]
    async fn sweep_keeps_unexpired_entries() {
        let store = test_store();
        let addr = email("a@x.com");
        let now = Timestamp::now();

        store.issue_at(&addr, Purpose::Registration, now).await;

        let report = store.sweep_at(now + SignedDuration::from_mins(1)).await;

        assert_eq!(report.total(), 0);
        assert_eq!(store.challenge_count().await, 1);
    }
}
