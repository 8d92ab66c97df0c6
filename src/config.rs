use std::num::NonZeroUsize;
use std::thread;

use crate::classify::ClassifierKind;
use crate::error::SplitError;
use crate::job::RemainderPolicy;

/// Launch-time parameters, identical for every rank of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitConfig {
    ranks: usize,
    remainder: RemainderPolicy,
    classifier: ClassifierKind,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ranks: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            remainder: RemainderPolicy::default(),
            classifier: ClassifierKind::default(),
        }
    }
}

impl SplitConfig {
    pub fn with_ranks(mut self, ranks: usize) -> Self {
        self.ranks = ranks;
        self
    }

    pub fn remainder(mut self, policy: RemainderPolicy) -> Self {
        self.remainder = policy;
        self
    }

    pub fn classifier(mut self, classifier: ClassifierKind) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    pub fn remainder_policy(&self) -> RemainderPolicy {
        self.remainder
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier
    }

    pub fn validate(&self) -> Result<(), SplitError> {
        if self.ranks == 0 {
            return Err(SplitError::Config("at least one rank is required".into()));
        }

        Ok(())
    }
}
