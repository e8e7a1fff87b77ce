use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::Link;

/// Concurrent map of every URL seen during a crawl.
///
/// The first insert for a URL wins; later sightings only bump the occurrence
/// counter on the stored record. Fetch tasks from both worker pools hit this
/// map concurrently, so all mutation goes through per-entry operations.
#[derive(Debug, Default)]
pub struct VisitedSet {
    links: DashMap<String, Link>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-if-absent. When the URL is already present, the stored record's
    /// occurrence counter is bumped (saturating) and the candidate is
    /// discarded. Returns whether the URL was already present.
    pub fn load_or_store(&self, candidate: Link) -> bool {
        match self.links.entry(candidate.url.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                stored.occurrences = stored.occurrences.saturating_add(1);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(candidate);
                false
            }
        }
    }

    /// Advisory duplicate check used before fetching: bumps the occurrence
    /// counter when the URL is present, never inserts. Returns whether the
    /// URL was present.
    pub fn note_duplicate(&self, url: &str) -> bool {
        match self.links.get_mut(url) {
            Some(mut stored) => {
                stored.occurrences = stored.occurrences.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, url: &str) -> Option<Link> {
        self.links.get(url).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Clone out every record. Only meaningful once the pipeline has
    /// signalled completion; no ordering is guaranteed.
    pub fn snapshot(&self) -> Vec<Link> {
        self.links.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use std::sync::Arc;

    #[test]
    fn test_first_insert_wins() {
        let set = VisitedSet::new();

        let present = set.load_or_store(Link::new("http://host/a", Status::Http(200)));
        assert!(!present);

        let present = set.load_or_store(Link::new("http://host/a", Status::Http(404)));
        assert!(present);

        let stored = set.get("http://host/a").unwrap();
        assert_eq!(stored.status, Status::Http(200));
        assert_eq!(stored.occurrences, 1);
    }

    #[test]
    fn test_note_duplicate_never_inserts() {
        let set = VisitedSet::new();

        assert!(!set.note_duplicate("http://host/a"));
        assert!(set.get("http://host/a").is_none());

        set.load_or_store(Link::new("http://host/a", Status::Http(200)));
        assert!(set.note_duplicate("http://host/a"));
        assert_eq!(set.get("http://host/a").unwrap().occurrences, 1);
    }

    #[test]
    fn test_occurrences_saturate() {
        let set = VisitedSet::new();
        set.load_or_store(Link::new("http://host/a", Status::Http(200)));

        for _ in 0..300 {
            set.note_duplicate("http://host/a");
        }

        assert_eq!(set.get("http://host/a").unwrap().occurrences, u8::MAX);
    }

    #[test]
    fn test_concurrent_load_or_store() {
        let set = Arc::new(VisitedSet::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        set.load_or_store(Link::new(
                            format!("http://host/page{}", i),
                            Status::Http(200),
                        ));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.len(), 100);
        for link in set.snapshot() {
            assert_eq!(link.occurrences, 7);
        }
    }
}
