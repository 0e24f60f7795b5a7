//! Aggregation helpers over annotated submissions: flag frequencies,
//! interviewer rankings, per-group summaries, and quota-vs-target
//! tables. Pure reducers; the dashboard layer renders their output.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::domain::{AnnotatedSubmission, ApprovalStatus, FlagKind};

/// Grouping key for summaries and quota tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    State,
    Lga,
    Interviewer,
}

impl GroupKey {
    fn of<'a>(&self, entry: &'a AnnotatedSubmission) -> &'a str {
        match self {
            GroupKey::State => &entry.submission.state,
            GroupKey::Lga => &entry.submission.lga,
            GroupKey::Interviewer => &entry.submission.interviewer_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagFrequency {
    pub flag: FlagKind,
    pub count: usize,
    pub percent_of_flags: f64,
}

/// Occurrence count per flag with its share of all flags raised, in
/// stable flag order. Flags never raised are omitted.
pub fn flag_frequency(batch: &[AnnotatedSubmission]) -> Vec<FlagFrequency> {
    let mut counts: BTreeMap<FlagKind, usize> = BTreeMap::new();
    for entry in batch {
        for flag in &entry.flags {
            *counts.entry(*flag).or_default() += 1;
        }
    }
    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(flag, count)| FlagFrequency {
            flag,
            count,
            percent_of_flags: if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterviewerRank {
    pub interviewer_id: String,
    pub total: usize,
    pub approved: usize,
    pub flagged: usize,
}

/// Interviewer leaderboard: approved desc, flagged asc, total desc,
/// interviewer id asc.
pub fn rank_interviewers(batch: &[AnnotatedSubmission]) -> Vec<InterviewerRank> {
    let mut rows: HashMap<&str, InterviewerRank> = HashMap::new();
    for entry in batch {
        let row = rows
            .entry(&entry.submission.interviewer_id)
            .or_insert_with(|| InterviewerRank {
                interviewer_id: entry.submission.interviewer_id.clone(),
                total: 0,
                approved: 0,
                flagged: 0,
            });
        row.total += 1;
        if entry.submission.status == ApprovalStatus::Approved {
            row.approved += 1;
        }
        if entry.is_flagged() {
            row.flagged += 1;
        }
    }

    let mut rows: Vec<InterviewerRank> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        b.approved
            .cmp(&a.approved)
            .then(a.flagged.cmp(&b.flagged))
            .then(b.total.cmp(&a.total))
            .then(a.interviewer_id.cmp(&b.interviewer_id))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub total: usize,
    pub approved: usize,
    pub approval_percent: f64,
}

/// Totals and approval percentage per group, sorted by group name.
pub fn group_summary(batch: &[AnnotatedSubmission], key: GroupKey) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for entry in batch {
        let (total, approved) = groups.entry(key.of(entry)).or_default();
        *total += 1;
        if entry.submission.status == ApprovalStatus::Approved {
            *approved += 1;
        }
    }
    groups
        .into_iter()
        .map(|(group, (total, approved))| GroupSummary {
            group: group.to_string(),
            total,
            approved,
            approval_percent: if total == 0 {
                0.0
            } else {
                approved as f64 * 100.0 / total as f64
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaProgress {
    pub group: String,
    pub achieved: usize,
    pub target: u64,
    pub percent_of_target: f64,
}

/// Achieved vs target counts per group. Groups present on either side of
/// the join appear: an unmet quota with zero submissions shows 0
/// achieved, and a group without a configured target shows target 0.
pub fn quota_progress(
    batch: &[AnnotatedSubmission],
    key: GroupKey,
    targets: &HashMap<String, u64>,
) -> Vec<QuotaProgress> {
    let mut achieved: BTreeMap<String, usize> = BTreeMap::new();
    for entry in batch {
        *achieved.entry(key.of(entry).to_string()).or_default() += 1;
    }
    for group in targets.keys() {
        achieved.entry(group.clone()).or_default();
    }

    achieved
        .into_iter()
        .map(|(group, count)| {
            let target = targets.get(&group).copied().unwrap_or(0);
            QuotaProgress {
                group,
                achieved: count,
                target,
                percent_of_target: if target == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / target as f64
                },
            }
        })
        .collect()
}
