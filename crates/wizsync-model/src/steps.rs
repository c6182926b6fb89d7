//! Ordered step layout of a wizard definition

use crate::draft::StepIndex;
use crate::ids::StepId;

/// Step 1: topic, government layer and entity
pub const QUERY_CONFIGURATION: &str = "query-configuration";
/// Step 2: choosing websites to scrape
pub const WEBSITE_SELECTION: &str = "website-selection";
/// Step 3: reviewing the scraped documents
pub const DOCUMENT_REVIEW: &str = "document-review";

/// Business actions of the research wizard
pub mod actions {
    /// Create the query resource from the step 1 inputs
    pub const CREATE_QUERY: &str = "create-query";
    /// Ask for website suggestions for the query
    pub const GENERATE_SUGGESTIONS: &str = "generate-suggestions";
    /// Start scraping the selected websites
    pub const START_SCAN: &str = "start-scan";
}

/// Step layout errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A layout needs at least one step
    #[error("step layout is empty")]
    Empty,

    /// Step ids must be unique
    #[error("duplicate step id: {0}")]
    Duplicate(StepId),
}

/// Linear ordering of step ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLayout {
    steps: Vec<StepId>,
}

impl StepLayout {
    /// Build a layout from ordered step ids
    ///
    /// # Errors
    /// Returns [`LayoutError`] when the list is empty or contains duplicates
    pub fn new<I, S>(steps: I) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        let mut out: Vec<StepId> = Vec::new();
        for step in steps {
            let step = step.into();
            if out.contains(&step) {
                return Err(LayoutError::Duplicate(step));
            }
            out.push(step);
        }
        if out.is_empty() {
            return Err(LayoutError::Empty);
        }
        Ok(Self { steps: out })
    }

    /// One-based index of `step`
    #[must_use]
    pub fn index_of(&self, step: &StepId) -> Option<StepIndex> {
        self.steps
            .iter()
            .position(|s| s == step)
            .map(|i| StepIndex(i + 1))
    }

    /// Step id at one-based `index`
    #[must_use]
    pub fn step_at(&self, index: StepIndex) -> Option<&StepId> {
        index
            .value()
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
    }

    /// First step id
    #[must_use]
    pub fn first(&self) -> &StepId {
        // Non-empty by construction
        &self.steps[0]
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; layouts are non-empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step ids in order
    pub fn iter(&self) -> impl Iterator<Item = &StepId> {
        self.steps.iter()
    }
}

impl Default for StepLayout {
    /// The three-step research wizard
    fn default() -> Self {
        Self {
            steps: vec![
                StepId::from(QUERY_CONFIGURATION),
                StepId::from(WEBSITE_SELECTION),
                StepId::from(DOCUMENT_REVIEW),
            ],
        }
    }
}
