//! Jaro-Winkler string similarity, used to match configured event names
//! against listing event names.
//!
//! Standard parameters: Winkler prefix boost only above a Jaro score of
//! 0.7, common prefix capped at 4 characters, scaling factor 0.1.

const BOOST_THRESHOLD: f64 = 0.7;
const PREFIX_CAP: usize = 4;
const PREFIX_SCALE: f64 = 0.1;

/// Case-insensitive Jaro-Winkler similarity between an event name pattern
/// and a listing's event name. Returns a score in 0-1.
pub fn name_similarity(pattern: &str, name: &str) -> f64 {
    jaro_winkler(&pattern.to_lowercase(), &name.to_lowercase())
}

pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let sim = jaro(a, b);
    if sim <= BOOST_THRESHOLD {
        return sim;
    }

    let prefix = a
        .chars()
        .zip(b.chars())
        .take(PREFIX_CAP)
        .take_while(|(x, y)| x == y)
        .count();

    (sim + prefix as f64 * PREFIX_SCALE * (1.0 - sim)).min(1.0)
}

pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);

    let mut b_taken = vec![false; b.len()];
    let mut a_matches: Vec<char> = Vec::new();

    for (i, &ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_taken[j] && ca == b[j] {
                b_taken[j] = true;
                a_matches.push(ca);
                break;
            }
        }
    }

    if a_matches.is_empty() {
        return 0.0;
    }

    // Transpositions: matched characters out of order, counted in halves.
    let b_matches = b
        .iter()
        .zip(&b_taken)
        .filter(|(_, taken)| **taken)
        .map(|(c, _)| *c);
    let transposed = a_matches
        .iter()
        .zip(b_matches)
        .filter(|(x, y)| **x != *y)
        .count() as f64
        / 2.0;

    let m = a_matches.len() as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transposed) / m) / 3.0
}
