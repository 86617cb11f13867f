/// Normalized form of a goal used for duplicate detection: whitespace runs
/// collapse to one space, leading and trailing whitespace is dropped.
pub fn goal_signature(goal: &str) -> String {
    goal.split_whitespace().collect::<Vec<_>>().join(" ")
}
