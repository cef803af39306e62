use crate::transport::SourceMessage;

/// Order a collected batch for replay: ascending by id, service messages dropped.
pub fn prepare(mut batch: Vec<SourceMessage>) -> Vec<SourceMessage> {
    batch.retain(|m| !m.is_service);
    batch.sort_unstable_by_key(|m| m.id);
    batch.dedup_by_key(|m| m.id);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[SourceMessage]) -> Vec<i64> {
        v.iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn sorts_ascending_and_drops_service_messages() {
        let batch = vec![
            SourceMessage::text(9, "c"),
            SourceMessage::service(7),
            SourceMessage::media(3, "doc:3", None),
            SourceMessage::text(5, "b"),
            SourceMessage::service(1),
        ];
        assert_eq!(ids(&prepare(batch)), vec![3, 5, 9]);
    }

    #[test]
    fn is_idempotent() {
        let batch = vec![
            SourceMessage::text(4, "d"),
            SourceMessage::service(2),
            SourceMessage::text(1, "a"),
            SourceMessage::text(3, ""),
        ];
        let once = prepare(batch);
        let twice = prepare(once.clone());
        assert_eq!(once, twice);
        assert!(once.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn empty_batch_stays_empty() {
        assert!(prepare(Vec::new()).is_empty());
    }
}
