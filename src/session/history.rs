use std::collections::VecDeque;

/// Distinct queries kept for quick re-submission.
pub const HISTORY_LIMIT: usize = 5;

/// Recently submitted raw queries, oldest evicted first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHistory {
    entries: VecDeque<String>,
}

impl SearchHistory {
    /// Record a query unless it is already present.
    pub fn record(&mut self, query: &str) {
        if self.entries.iter().any(|entry| entry == query) {
            return;
        }
        self.entries.push_back(query.to_string());
        if self.entries.len() > HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    /// Entry by position, newest first.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.newest_first().nth(index)
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_five_distinct_queries() {
        let mut history = SearchHistory::default();
        for query in ["a", "b", "a", "c", "d", "e", "f"] {
            history.record(query);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        let recent: Vec<&str> = history.newest_first().collect();
        assert_eq!(recent, vec!["f", "e", "d", "c", "b"]);
        assert_eq!(history.get(0), Some("f"));
        assert_eq!(history.get(5), None);
    }

    #[test]
    fn duplicate_does_not_reorder() {
        let mut history = SearchHistory::default();
        history.record("vpn setup");
        history.record("travel policy");
        history.record("vpn setup");
        assert_eq!(history.get(0), Some("travel policy"));
        assert_eq!(history.get(1), Some("vpn setup"));
    }
}
