use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::availability::is_valid_window;
use crate::error::{EngineError, Result};
use crate::models::{
    AgeRange, EnqueueRequest, EntryId, EntryState, MatchingPolicy, PaymentStatus, Preferences,
    Profile, VerificationStatus, WaitingEntry,
};
use crate::services::{EntryStore, PaymentService, VerificationService};

/// Admits participants into the waiting pool
///
/// Verification is looked up and the entry fee captured before the entry is
/// stored. Entries whose gates are still closed are stored anyway and become
/// eligible once the collaborators call back.
#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn EntryStore>,
    verification: Arc<dyn VerificationService>,
    payments: Arc<dyn PaymentService>,
    policy: Arc<MatchingPolicy>,
}

impl Intake {
    pub fn new(
        store: Arc<dyn EntryStore>,
        verification: Arc<dyn VerificationService>,
        payments: Arc<dyn PaymentService>,
        policy: Arc<MatchingPolicy>,
    ) -> Self {
        Self {
            store,
            verification,
            payments,
            policy,
        }
    }

    pub async fn submit(&self, request: EnqueueRequest) -> Result<WaitingEntry> {
        self.submit_at(request, Utc::now()).await
    }

    pub async fn submit_at(&self, request: EnqueueRequest, now: DateTime<Utc>) -> Result<WaitingEntry> {
        request.validate()?;

        if request.preferred_age_min > request.preferred_age_max {
            return Err(EngineError::Validation(format!(
                "preferred age range {}-{} is empty",
                request.preferred_age_min, request.preferred_age_max
            )));
        }
        if let Some(window) = request.availability.iter().find(|w| !is_valid_window(w)) {
            return Err(EngineError::Validation(format!(
                "availability window on {} must start before it ends",
                window.date
            )));
        }

        let verification_status = if self.verification.is_verified(&request.participant_id).await? {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Pending
        };
        let payment_status = self
            .payments
            .capture(&request.participant_id, self.policy.entry_fee_cents)
            .await?;

        let entry = WaitingEntry {
            id: Uuid::new_v4(),
            participant_id: request.participant_id,
            profile: Profile {
                age: request.age,
                gender: request.gender,
            },
            preferences: Preferences {
                age_range: AgeRange {
                    min: request.preferred_age_min,
                    max: request.preferred_age_max,
                },
                gender_preference: request.gender_preference,
                meeting_type: request.meeting_type,
            },
            availability: request.availability,
            verification_status,
            payment_status,
            enqueued_at: now,
            state: EntryState::Waiting,
            reservation_token: None,
            cooldown_until: None,
            updated_at: now,
            archived_at: None,
        };

        if let Err(e) = self.store.enqueue(entry.clone()).await {
            if payment_status == PaymentStatus::Paid {
                if let Err(refund_error) = self.payments.refund(&entry.participant_id, None).await {
                    tracing::error!(
                        "Entry for {} was rejected and the fee could not be refunded: {}",
                        entry.participant_id,
                        refund_error
                    );
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            "Enqueued entry {} for {} (verification {}, payment {})",
            entry.id,
            entry.participant_id,
            entry.verification_status,
            entry.payment_status
        );

        Ok(entry)
    }

    pub async fn get_entry(&self, id: EntryId) -> Result<WaitingEntry> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("entry {}", id)))
    }

    /// Apply a verification or payment callback
    pub async fn update_gates(
        &self,
        id: EntryId,
        verification: Option<VerificationStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<WaitingEntry> {
        if verification.is_none() && payment.is_none() {
            return Err(EngineError::Validation(
                "at least one of verificationStatus or paymentStatus is required".to_string(),
            ));
        }

        let entry = self.store.update_gates(id, verification, payment).await?;
        tracing::debug!(
            "Gates of entry {} now verification {}, payment {}",
            id,
            entry.verification_status,
            entry.payment_status
        );
        Ok(entry)
    }
}
