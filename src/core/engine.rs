use std::sync::Arc;

use crate::core::{
    admin::AdminGateway, coordinator::ConfirmationCoordinator, evaluator::CompatibilityEvaluator,
    intake::Intake, matcher::Matcher, proposal::Proposer,
};
use crate::models::{MatchingPolicy, ScoringWeights};
use crate::services::{
    EntryStore, NotificationDispatcher, Notifier, PaymentService, VerificationService,
};

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub verification: Arc<dyn VerificationService>,
    pub payments: Arc<dyn PaymentService>,
    pub notifier: Arc<dyn Notifier>,
}

/// All engine components wired over one store
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn EntryStore>,
    pub intake: Arc<Intake>,
    pub matcher: Arc<Matcher>,
    pub coordinator: Arc<ConfirmationCoordinator>,
    pub admin: Arc<AdminGateway>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn EntryStore>,
        collaborators: Collaborators,
        policy: MatchingPolicy,
        weights: ScoringWeights,
    ) -> Self {
        let policy = Arc::new(policy);
        let evaluator = CompatibilityEvaluator::from_policy(&policy, weights);
        let notifications = NotificationDispatcher::new(collaborators.notifier);
        let proposer = Proposer::new(store.clone(), notifications.clone(), policy.clone());

        Self {
            intake: Arc::new(Intake::new(
                store.clone(),
                collaborators.verification,
                collaborators.payments.clone(),
                policy.clone(),
            )),
            matcher: Arc::new(Matcher::new(store.clone(), evaluator.clone(), proposer.clone())),
            coordinator: Arc::new(ConfirmationCoordinator::new(
                store.clone(),
                collaborators.payments,
                notifications,
                policy,
            )),
            admin: Arc::new(AdminGateway::new(store.clone(), evaluator, proposer)),
            store,
        }
    }
}
