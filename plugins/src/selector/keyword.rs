use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use taskwave_core::api::{Capability, CapabilitySelector, ReasoningModel};
use tracing::debug;

/// Picks capabilities whose name parts appear as words in the task's name or
/// description. Catalog order is preserved; the model is not consulted.
#[derive(Debug, Default)]
pub struct KeywordSelector {
    /// Upper bound on selected capabilities; 0 means unlimited.
    max_matches: usize,
}

impl KeywordSelector {
    pub fn new(max_matches: usize) -> Self {
        Self { max_matches }
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl CapabilitySelector for KeywordSelector {
    async fn recognize_intent(
        &self,
        task_name: &str,
        task_description: &str,
        catalog: &[Arc<dyn Capability>],
        _model: Option<&Arc<dyn ReasoningModel>>,
    ) -> Result<Vec<Arc<dyn Capability>>> {
        let vocabulary = words(&format!("{} {}", task_name, task_description));

        let mut selected: Vec<Arc<dyn Capability>> = catalog
            .iter()
            .filter(|cap| {
                let name = cap.name().to_lowercase();
                vocabulary.contains(&name)
                    || name
                        .split(['_', '-', '.'])
                        .filter(|part| part.len() > 2)
                        .any(|part| vocabulary.contains(part))
            })
            .cloned()
            .collect();

        if self.max_matches > 0 {
            selected.truncate(self.max_matches);
        }
        debug!(
            task = task_name,
            selected = ?selected.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            "keyword selection"
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{builtin_capabilities, EchoCapability};

    fn names(caps: &[Arc<dyn Capability>]) -> Vec<String> {
        caps.iter().map(|c| c.name().to_string()).collect()
    }

    #[tokio::test]
    async fn matches_name_parts_in_description() {
        let catalog = builtin_capabilities(None);
        let selected = KeywordSelector::default()
            .recognize_intent("summarize", "Read the changelog file and run a shell check", &catalog, None)
            .await
            .unwrap();

        assert_eq!(names(&selected), vec!["shell", "read_file", "write_file"]);
    }

    #[tokio::test]
    async fn respects_max_matches_and_empty_result() {
        let catalog: Vec<Arc<dyn Capability>> = vec![Arc::new(EchoCapability)];
        let selector = KeywordSelector::new(1);

        let none = selector
            .recognize_intent("compile", "", &catalog, None)
            .await
            .unwrap();
        assert!(none.is_empty());

        let echo = selector
            .recognize_intent("echo back", "", &catalog, None)
            .await
            .unwrap();
        assert_eq!(names(&echo), vec!["echo"]);
    }
}
