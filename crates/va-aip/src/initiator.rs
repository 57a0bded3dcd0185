//! `Initiator` (§4.2): what caused a `recognize()` call.

/// The begin/end byte-index pair a wake-word engine reports alongside the
/// detected keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakewordIndices {
    pub begin_index: Option<u64>,
    pub end_index: Option<u64>,
}

impl WakewordIndices {
    /// Resolves the index AIP should start streaming the capture from:
    /// `begin_index` if present; else `end_index` if present (start
    /// streaming from where the wake word ended); else `None`, meaning
    /// "start from the writer's current cursor."
    pub fn stream_start_index(&self) -> Option<u64> {
        self.begin_index.or(self.end_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiator {
    PressAndHold,
    Tap,
    Wakeword {
        indices: WakewordIndices,
        keyword: String,
    },
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_index_takes_precedence_over_end_index() {
        let indices = WakewordIndices {
            begin_index: Some(10),
            end_index: Some(20),
        };
        assert_eq!(indices.stream_start_index(), Some(10));
    }

    #[test]
    fn falls_back_to_end_index_when_begin_is_missing() {
        let indices = WakewordIndices {
            begin_index: None,
            end_index: Some(20),
        };
        assert_eq!(indices.stream_start_index(), Some(20));
    }

    #[test]
    fn none_when_both_are_missing() {
        let indices = WakewordIndices {
            begin_index: None,
            end_index: None,
        };
        assert_eq!(indices.stream_start_index(), None);
    }
}
