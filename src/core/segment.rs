use chrono::{Duration, NaiveDateTime};

/// Split a time-ordered stream into runs where each element is at most
/// `max_gap` after its predecessor.
///
/// Each element is compared with the element right before it, not with the
/// start of its group, so a slow steady burst stays in one group however long
/// it lasts. The input is not sorted here; out-of-order timestamps produce a
/// negative gap and stay in the current group.
pub fn segment<T: Clone>(stream: &[(T, NaiveDateTime)], max_gap: Duration) -> Vec<Vec<T>> {
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut previous: Option<NaiveDateTime> = None;

    for (id, taken_at) in stream {
        if let Some(prev) = previous {
            if *taken_at - prev > max_gap {
                groups.push(std::mem::take(&mut current));
            }
        }
        current.push(id.clone());
        previous = Some(*taken_at);
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

/// What a segment is presumed to contain, decided by its size alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Color charts and name labels shot between specimens.
    Calibration,
    /// A full capture burst of one specimen.
    Specimen,
}

impl SegmentKind {
    pub fn classify(len: usize, min_specimen_size: usize) -> Self {
        if len < min_specimen_size {
            SegmentKind::Calibration
        } else {
            SegmentKind::Specimen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn stream(times: &[NaiveDateTime]) -> Vec<(usize, NaiveDateTime)> {
        times.iter().copied().enumerate().collect()
    }

    fn three_minutes() -> Duration {
        Duration::minutes(3)
    }

    /// Checks the partition laws for one input.
    fn assert_partition(input: &[(usize, NaiveDateTime)], groups: &[Vec<usize>], max_gap: Duration) {
        let flattened: Vec<usize> = groups.iter().flatten().copied().collect();
        let expected: Vec<usize> = input.iter().map(|(id, _)| *id).collect();
        assert_eq!(flattened, expected);

        let time_of = |id: usize| input[id].1;
        for group in groups {
            assert!(!group.is_empty());
            for pair in group.windows(2) {
                assert!(time_of(pair[1]) - time_of(pair[0]) <= max_gap);
            }
        }
        for pair in groups.windows(2) {
            let last = *pair[0].last().unwrap();
            let first = pair[1][0];
            assert!(time_of(first) - time_of(last) > max_gap);
        }
    }

    #[test]
    fn test_empty_stream() {
        let groups = segment::<usize>(&[], three_minutes());
        assert!(groups.is_empty());
    }

    #[test]
    fn test_single_element() {
        let input = stream(&[at(10, 0, 0)]);
        assert_eq!(segment(&input, three_minutes()), vec![vec![0]]);
    }

    #[test]
    fn test_all_within_threshold() {
        let input = stream(&[at(10, 0, 0), at(10, 2, 0), at(10, 4, 0), at(10, 7, 0)]);
        let groups = segment(&input, three_minutes());
        assert_eq!(groups, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_gap_exactly_threshold_joins() {
        let input = stream(&[at(10, 0, 0), at(10, 3, 0), at(10, 6, 1)]);
        let groups = segment(&input, three_minutes());
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_compares_with_previous_not_group_start() {
        // 10:00 -> 10:02:59 -> 10:05:58: each step is under 3 minutes while
        // the span is nearly 6.
        let input = stream(&[at(10, 0, 0), at(10, 2, 59), at(10, 5, 58)]);
        assert_eq!(segment(&input, three_minutes()).len(), 1);
    }

    #[test]
    fn test_group_count_is_one_plus_large_gaps() {
        let times = [
            at(9, 0, 0),
            at(9, 0, 10),
            at(9, 10, 0),
            at(9, 30, 0),
            at(9, 31, 0),
            at(9, 31, 30),
            at(11, 0, 0),
        ];
        let input = stream(&times);
        let groups = segment(&input, three_minutes());

        let large_gaps = times
            .windows(2)
            .filter(|w| w[1] - w[0] > three_minutes())
            .count();
        assert_eq!(groups.len(), 1 + large_gaps);
        assert_partition(&input, &groups, three_minutes());
    }

    #[test]
    fn test_partition_laws_over_generated_streams() {
        // Deterministic pseudo-random gaps between 0 and 400 seconds.
        let mut seed: u64 = 0x5eed;
        for len in 0..40 {
            let mut t = at(8, 0, 0);
            let mut times = Vec::with_capacity(len);
            for _ in 0..len {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                t += Duration::seconds(((seed >> 33) % 400) as i64);
                times.push(t);
            }
            let input = stream(&times);
            let groups = segment(&input, three_minutes());
            assert_partition(&input, &groups, three_minutes());
        }
    }

    #[test]
    fn test_resegmenting_a_group_returns_it() {
        let times = [
            at(10, 0, 0),
            at(10, 0, 30),
            at(10, 5, 0),
            at(10, 5, 20),
            at(10, 6, 50),
            at(10, 20, 0),
        ];
        let input = stream(&times);
        for group in segment(&input, three_minutes()) {
            let sub: Vec<(usize, NaiveDateTime)> = group.iter().map(|&id| input[id]).collect();
            assert_eq!(segment(&sub, three_minutes()), vec![group.clone()]);
        }
    }

    #[test]
    fn test_classification_boundary() {
        assert_eq!(SegmentKind::classify(5, 6), SegmentKind::Calibration);
        assert_eq!(SegmentKind::classify(6, 6), SegmentKind::Specimen);
        assert_eq!(SegmentKind::classify(1, 6), SegmentKind::Calibration);
        assert_eq!(SegmentKind::classify(40, 6), SegmentKind::Specimen);
    }
}
