//! Deterministic plan identifiers and the approval match.

/// `"plan-" + sanitize(revision)`.
///
/// `main/abc123` and `main@sha1:abc123` both map to `plan-main-abc123`.
/// A bare digest maps to `plan-<digest>`.
pub fn plan_id(revision: &str) -> String {
    format!("plan-{}", sanitize(revision))
}

fn sanitize(revision: &str) -> String {
    if let Some((branch, digest)) = revision.split_once('@') {
        let digest = digest.split_once(':').map_or(digest, |(_, hash)| hash);
        return format!("{branch}-{digest}");
    }
    revision.replacen('/', "-", 1)
}

/// `<message>: set approvePlan: "<id>" to approve this plan.`
pub fn approve_message(plan_id: &str, message: &str) -> String {
    format!("{message}: set approvePlan: \"{plan_id}\" to approve this plan.")
}

/// An approval value matches when it equals the pending identifier or is a
/// left-anchored prefix of it. Empty values never match.
pub fn approves(approval: &str, pending: &str) -> bool {
    !approval.is_empty() && !pending.is_empty() && pending.starts_with(approval)
}
