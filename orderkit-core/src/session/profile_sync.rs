//! Ordered fallback chains that resolve a backend profile after the identity
//! provider has accepted the principal.
//!
//! Sign-in tries fetch → create → login; registration tries create → login. A
//! step that reports "not found" or "already exists" hands over to the next
//! step; any other failure aborts the chain.

use async_trait::async_trait;

use crate::backend::UserProfile;
use crate::error::OrderKitError;

/// One backend call of a profile sync plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSyncStep {
    /// `GET /auth/me`.
    FetchProfile,
    /// `POST /auth/signup`.
    CreateProfile,
    /// `POST /auth/login`.
    Login,
}

/// What a step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The backend returned the profile.
    Resolved(UserProfile),
    /// The backend has no profile yet.
    NotFound,
    /// The profile already exists.
    Conflict,
}

impl StepOutcome {
    /// Classifies a backend result; fallback-worthy errors become outcomes,
    /// every other error is returned as is.
    pub(crate) fn classify(
        result: Result<UserProfile, OrderKitError>,
    ) -> Result<Self, OrderKitError> {
        match result {
            Ok(profile) => Ok(Self::Resolved(profile)),
            Err(OrderKitError::ProfileNotFound) => Ok(Self::NotFound),
            Err(OrderKitError::Conflict(message)) => {
                log::debug!("profile already exists: {message}");
                Ok(Self::Conflict)
            }
            Err(err) => Err(err),
        }
    }
}

/// An ordered list of steps tried until one resolves a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSyncPlan {
    steps: Vec<ProfileSyncStep>,
}

impl ProfileSyncPlan {
    /// Plan for signing in an existing principal.
    #[must_use]
    pub fn sign_in() -> Self {
        Self {
            steps: vec![
                ProfileSyncStep::FetchProfile,
                ProfileSyncStep::CreateProfile,
                ProfileSyncStep::Login,
            ],
        }
    }

    /// Plan for a freshly registered principal.
    #[must_use]
    pub fn register() -> Self {
        Self {
            steps: vec![ProfileSyncStep::CreateProfile, ProfileSyncStep::Login],
        }
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[ProfileSyncStep] {
        &self.steps
    }

    /// Runs the plan, returning the first resolved profile.
    ///
    /// # Errors
    ///
    /// Returns the first error a step raises, or
    /// [`OrderKitError::ProfileUnavailable`] once every step fell through.
    pub async fn resolve<R>(&self, runner: &R) -> Result<UserProfile, OrderKitError>
    where
        R: ProfileStepRunner + ?Sized,
    {
        for step in &self.steps {
            match runner.run(*step).await? {
                StepOutcome::Resolved(profile) => return Ok(profile),
                outcome => log::debug!("profile step {step:?} fell through: {outcome:?}"),
            }
        }
        Err(OrderKitError::ProfileUnavailable)
    }
}

/// Executes a single plan step.
#[async_trait]
pub trait ProfileStepRunner: Send + Sync {
    /// Runs `step`, classifying fallback-worthy backend answers as outcomes.
    async fn run(&self, step: ProfileSyncStep) -> Result<StepOutcome, OrderKitError>;
}
