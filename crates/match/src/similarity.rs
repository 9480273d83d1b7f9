const WINKLER_PREFIX_CAP: usize = 4;
const WINKLER_SCALE: f32 = 0.1;

/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm.
///
/// Counts `char`s, not bytes, so "餐饮美食" is four units long.
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let (m, n) = (a.len(), b.len());

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for j in 1..=n {
        curr[0] = j;
        for i in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[i] = (prev[i] + 1).min(curr[i - 1] + 1).min(prev[i - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Levenshtein similarity in [0.0, 1.0]: `1 - distance / longest_len`.
pub fn normalized_levenshtein(s1: &str, s2: &str) -> f32 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(s1, s2) as f32 / max_len as f32
}

/// Plain Jaro similarity in [0.0, 1.0].
pub fn jaro(s1: &str, s2: &str) -> f32 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    jaro_chars(&a, &b)
}

/// Jaro similarity boosted by a common-prefix bonus (prefix capped at 4, scale 0.1).
pub fn jaro_winkler(s1: &str, s2: &str) -> f32 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    let jaro = jaro_chars(&a, &b);
    let prefix = a
        .iter()
        .zip(b.iter())
        .take(WINKLER_PREFIX_CAP)
        .take_while(|(x, y)| x == y)
        .count() as f32;

    (jaro + prefix * WINKLER_SCALE * (1.0 - jaro)).min(1.0)
}

fn jaro_chars(a: &[char], b: &[char]) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);

    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    // Half the number of matched characters that appear out of order.
    let a_seq = a.iter().zip(&a_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let b_seq = b.iter().zip(&b_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let transpositions = a_seq.zip(b_seq).filter(|(x, y)| x != y).count() / 2;

    let m = matches as f32;
    (m / a.len() as f32 + m / b.len() as f32 + (m - transpositions as f32) / m) / 3.0
}
