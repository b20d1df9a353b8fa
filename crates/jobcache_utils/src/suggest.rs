/// Picks the candidate closest to `target` by edit distance, ignoring ASCII
/// case. Returns `None` when nothing is close enough to be a plausible typo.
pub fn find_best_match<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let target = target.to_ascii_lowercase();
    let threshold = if target.chars().count() < 3 { 1 } else { 2 };

    candidates
        .into_iter()
        .map(|candidate| (candidate, edit_distance(&target, &candidate.to_ascii_lowercase())))
        .filter(|(_, distance)| *distance <= threshold)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

fn edit_distance(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, lc) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != *rc);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_near_miss() {
        let names = ["rx", "ry", "rz", "measure", "snapshot"];
        assert_eq!(find_best_match("mesure", names), Some("measure"));
        assert_eq!(find_best_match("SNAPSHOT", names), Some("snapshot"));
    }

    #[test]
    fn rejects_distant_names() {
        let names = ["rx", "ry", "rz"];
        assert_eq!(find_best_match("toffoli", names), None);
    }

    #[test]
    fn distance_matches_classic_examples() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
