use chrono::NaiveDate;

use crate::models::DailyPoint;

/// Most labels an x-axis shows before thinning kicks in.
pub const MAX_AXIS_LABELS: usize = 8;

/// Blank out labels so at most about [`MAX_AXIS_LABELS`] remain visible.
///
/// Positions are blanked, never removed, so the output stays aligned 1:1 with
/// the data series. Index 0 is always kept.
#[must_use]
pub fn thin_labels(labels: &[String]) -> Vec<String> {
    let n = labels.len();
    if n <= MAX_AXIS_LABELS {
        return labels.to_vec();
    }
    let step = n.div_ceil(MAX_AXIS_LABELS);
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| if i % step == 0 { l.clone() } else { String::new() })
        .collect()
}

/// Short axis label, e.g. `Mar 5`.
#[must_use]
pub fn axis_label(day: NaiveDate) -> String {
    day.format("%b %-d").to_string()
}

#[must_use]
pub fn axis_labels(series: &[DailyPoint]) -> Vec<String> {
    let labels: Vec<String> = series.iter().map(|p| axis_label(p.day)).collect();
    thin_labels(&labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("L{i}")).collect()
    }

    #[test]
    fn test_short_sequences_unchanged() {
        for n in 0..=8 {
            let labels = numbered(n);
            assert_eq!(thin_labels(&labels), labels);
        }
    }

    #[test]
    fn test_seventeen_labels() {
        let out = thin_labels(&numbered(17));
        assert_eq!(out.len(), 17);
        let visible: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(visible, vec![0, 3, 6, 9, 12, 15]);
        assert_eq!(out[3], "L3");
    }

    #[test]
    fn test_nine_labels_step_two() {
        let out = thin_labels(&numbered(9));
        assert_eq!(out, vec!["L0", "", "L2", "", "L4", "", "L6", "", "L8"]);
    }

    #[test]
    fn test_first_label_always_kept() {
        for n in 9..100 {
            let out = thin_labels(&numbered(n));
            assert_eq!(out.len(), n);
            assert_eq!(out[0], "L0");
            assert!(out.iter().filter(|l| !l.is_empty()).count() <= MAX_AXIS_LABELS);
        }
    }

    #[test]
    fn test_axis_label_format() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(axis_label(d), "Mar 5");
    }

    #[test]
    fn test_axis_labels_from_series() {
        let series: Vec<DailyPoint> = (1..=10)
            .map(|d| DailyPoint {
                day: NaiveDate::from_ymd_opt(2024, 6, d).unwrap(),
                value: 180.0,
            })
            .collect();
        let labels = axis_labels(&series);
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[0], "Jun 1");
        assert_eq!(labels[1], "");
        assert_eq!(labels[2], "Jun 3");
    }
}
