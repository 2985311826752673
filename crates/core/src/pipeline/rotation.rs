use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin over the configured sender identities. Owned by the outreach stage.
#[derive(Debug)]
pub struct SenderRotation {
    senders: Vec<String>,
    cursor: AtomicUsize,
}

impl SenderRotation {
    pub fn new(senders: Vec<String>) -> Self {
        let senders = senders.into_iter().filter(|sender| !sender.trim().is_empty()).collect();
        Self { senders, cursor: AtomicUsize::new(0) }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn next_sender(&self) -> Option<String> {
        if self.senders.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::SenderRotation;

    #[test]
    fn cycles_through_senders() {
        let rotation = SenderRotation::new(vec!["a@x.com".into(), " ".into(), "b@x.com".into()]);
        let picked: Vec<_> = (0..5).filter_map(|_| rotation.next_sender()).collect();
        assert_eq!(picked, vec!["a@x.com", "b@x.com", "a@x.com", "b@x.com", "a@x.com"]);
    }

    #[test]
    fn separate_rotations_do_not_share_state() {
        let first = SenderRotation::new(vec!["a@x.com".into(), "b@x.com".into()]);
        let second = SenderRotation::new(vec!["a@x.com".into(), "b@x.com".into()]);
        assert_eq!(first.next_sender().as_deref(), Some("a@x.com"));
        assert_eq!(second.next_sender().as_deref(), Some("a@x.com"));
        assert!(SenderRotation::new(Vec::new()).next_sender().is_none());
    }
}
