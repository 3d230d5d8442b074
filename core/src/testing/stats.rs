use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use super::result::{TestCaseResult, Verdict};

/// Wall-time statistics in milliseconds. All zero when there are no samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeStats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: f64,
}

impl TimeStats {
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let mean = sorted.iter().sum::<u64>() as f64 / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2] as f64
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
        };

        Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateStatus {
    Accepted { tests: u32 },
    Failed { verdict: Verdict, test_index: u32 },
    Reference { tests: u32 },
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CandidateStatus::*;
        match self {
            Accepted { tests } => write!(f, "accepted, {} tests", tests),
            Failed {
                verdict,
                test_index,
            } => write!(f, "failed with verdict {} at test index {}", verdict, test_index),
            Reference { tests } => write!(f, "reference, {} tests", tests),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub name: String,
    #[serde(flatten)]
    pub status: CandidateStatus,
    pub time_ms: TimeStats,
}

/// Collects wall times per program and turns them into the final table.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    reference: Option<String>,
    reference_samples: Vec<u64>,
    samples: BTreeMap<String, Vec<u64>>,
    first_failure: BTreeMap<String, (Verdict, u32)>,
}

impl ResultAggregator {
    /// `candidates` fixes the set of rows; `reference` adds a row for the reference program.
    pub fn new<'a>(
        candidates: impl IntoIterator<Item = &'a str>,
        reference: Option<String>,
    ) -> Self {
        Self {
            reference,
            reference_samples: Vec::new(),
            samples: candidates
                .into_iter()
                .map(|name| (name.to_owned(), Vec::new()))
                .collect(),
            first_failure: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, result: &TestCaseResult) {
        if self.reference.is_some() {
            self.reference_samples.push(result.reference_time_ms);
        }
        for r in &result.candidates {
            self.samples
                .entry(r.candidate.clone())
                .or_default()
                .push(r.wall_time_ms);
            if r.verdict != Verdict::Accepted {
                self.first_failure
                    .entry(r.candidate.clone())
                    .or_insert((r.verdict, result.index));
            }
        }
    }

    /// Rows sorted by program name.
    pub fn rows(&self) -> Vec<AggregateRow> {
        let mut rows: Vec<_> = self
            .samples
            .iter()
            .map(|(name, samples)| {
                let status = match self.first_failure.get(name) {
                    Some(&(verdict, test_index)) => CandidateStatus::Failed {
                        verdict,
                        test_index,
                    },
                    None => CandidateStatus::Accepted {
                        tests: samples.len() as u32,
                    },
                };
                AggregateRow {
                    name: name.clone(),
                    status,
                    time_ms: TimeStats::from_samples(samples),
                }
            })
            .collect();

        if let Some(name) = &self.reference {
            rows.push(AggregateRow {
                name: name.clone(),
                status: CandidateStatus::Reference {
                    tests: self.reference_samples.len() as u32,
                },
                time_ms: TimeStats::from_samples(&self.reference_samples),
            });
            rows.sort_by(|a, b| a.name.cmp(&b.name));
        }
        rows
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::result::CandidateResult;

    fn result(index: u32, reference_time_ms: u64, rows: &[(&str, Verdict, u64)]) -> TestCaseResult {
        TestCaseResult {
            index,
            seed: index,
            input: Vec::new(),
            answer: Vec::new(),
            reference_time_ms,
            candidates: rows
                .iter()
                .map(|&(name, verdict, wall_time_ms)| CandidateResult {
                    candidate: name.to_owned(),
                    verdict,
                    wall_time_ms,
                    comment: String::new(),
                    output: None,
                })
                .collect(),
        }
    }

    #[test]
    fn time_stats_of_odd_and_even_samples() {
        let s = TimeStats::from_samples(&[5, 1, 3]);
        assert_eq!((s.min, s.max), (1, 5));
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.median, 3.0);

        let s = TimeStats::from_samples(&[4, 1, 2, 10]);
        assert_eq!((s.min, s.max), (1, 10));
        assert_eq!(s.mean, 4.25);
        assert_eq!(s.median, 3.0);

        assert_eq!(TimeStats::from_samples(&[]), TimeStats::default());
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            CandidateStatus::Accepted { tests: 32 }.to_string(),
            "accepted, 32 tests"
        );
        assert_eq!(
            CandidateStatus::Failed {
                verdict: Verdict::WrongAnswer,
                test_index: 3
            }
            .to_string(),
            "failed with verdict wrong answer at test index 3"
        );
    }

    #[test]
    fn rows_report_first_failure_and_timings() {
        let mut agg = ResultAggregator::new(["b", "a"], None);
        agg.record(&result(1, 9, &[("a", Verdict::Accepted, 10), ("b", Verdict::Accepted, 30)]));
        agg.record(&result(2, 9, &[("a", Verdict::Accepted, 20), ("b", Verdict::TimeLimitExceeded, 1000)]));
        agg.record(&result(3, 9, &[("a", Verdict::Accepted, 30)]));

        let rows = agg.rows();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[0].status, CandidateStatus::Accepted { tests: 3 });
        assert_eq!(rows[0].time_ms.median, 20.0);

        assert_eq!(rows[1].name, "b");
        assert_eq!(
            rows[1].status,
            CandidateStatus::Failed {
                verdict: Verdict::TimeLimitExceeded,
                test_index: 2
            }
        );
        assert_eq!(rows[1].time_ms.max, 1000);
    }

    #[test]
    fn reference_row_is_optional() {
        let mut agg = ResultAggregator::new(["cand"], Some("main".to_owned()));
        agg.record(&result(1, 7, &[("cand", Verdict::Accepted, 10)]));
        agg.record(&result(2, 9, &[("cand", Verdict::Accepted, 10)]));

        let rows = agg.rows();
        let main = rows.iter().find(|r| r.name == "main").unwrap();
        assert_eq!(main.status, CandidateStatus::Reference { tests: 2 });
        assert_eq!(main.time_ms.mean, 8.0);

        let without = ResultAggregator::new(["cand"], None);
        assert!(without.rows().iter().all(|r| r.name != "main"));
    }

    #[test]
    fn rows_serialize_flat() {
        let mut agg = ResultAggregator::new(["a"], None);
        agg.record(&result(1, 0, &[("a", Verdict::WrongAnswer, 4)]));
        let json = serde_json::to_value(agg.rows()).unwrap();
        assert_eq!(json[0]["name"], "a");
        assert_eq!(json[0]["status"], "failed");
        assert_eq!(json[0]["verdict"], "wrong_answer");
        assert_eq!(json[0]["test_index"], 1);
        assert_eq!(json[0]["time_ms"]["max"], 4);
    }
}
