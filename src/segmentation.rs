use md5::{Digest, Md5};

/// Substituted when a chapter descriptor carries no usable scramble threshold.
pub const DEFAULT_SCRAMBLE_THRESHOLD: i64 = 220980;

// Protocol constants reverse-engineered from the origin service. Chapters below
// the threshold are served unscrambled, a transitional range is uniformly cut
// into ten bands, and everything newer derives its band count from a content
// hash. Do not "correct" these values; compatibility depends on them.
const UNIFORM_SLICE_CUTOFF: i64 = 268850;
const UNIFORM_SLICE_COUNT: u32 = 10;
const NARROW_HASH_CUTOFF: i64 = 421926;

/// Number of horizontal bands the origin cut this page into before reordering.
///
/// A result of 0 or 1 means the page is served as-is and needs no
/// reconstruction. Pure function of its arguments.
pub fn slice_count(album_id: i64, scramble_threshold_id: i64, filename: &str) -> u32 {
    let sid = if scramble_threshold_id <= 0 {
        DEFAULT_SCRAMBLE_THRESHOLD
    } else {
        scramble_threshold_id
    };

    if album_id < sid {
        return 0;
    }
    if album_id < UNIFORM_SLICE_CUTOFF {
        return UNIFORM_SLICE_COUNT;
    }

    let stem = filename_stem(filename);
    let digest = Md5::digest(format!("{album_id}{stem}").as_bytes());
    let hex = format!("{digest:x}");
    let key_code = hex.as_bytes()[hex.len() - 1] as u32;

    if album_id > NARROW_HASH_CUTOFF {
        (key_code % 8) * 2 + 2
    } else {
        (key_code % 10) * 2 + 2
    }
}

/// Animated pages are never sliced by the origin and must be rendered as-is.
pub fn is_animated(filename: &str) -> bool {
    let bytes = filename.as_bytes();
    bytes.len() >= 4 && bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".gif")
}

/// The hash input uses the filename up to the first dot, extension dropped.
fn filename_stem(filename: &str) -> &str {
    filename.split('.').next().unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn albums_below_threshold_are_unscrambled() {
        assert_eq!(slice_count(100, 220980, "00001.jpg"), 0);
        assert_eq!(slice_count(220979, 220980, "00001.jpg"), 0);
        assert_eq!(slice_count(9999, 10000, "page.webp"), 0);
    }

    #[test]
    fn nonpositive_threshold_falls_back_to_default() {
        assert_eq!(slice_count(220979, 0, "00001.jpg"), 0);
        assert_eq!(slice_count(220979, -5, "00001.jpg"), 0);
        assert_eq!(slice_count(220980, 0, "00001.jpg"), 10);
    }

    #[test]
    fn transitional_range_uses_uniform_count() {
        assert_eq!(slice_count(220980, 220980, "00001.jpg"), 10);
        assert_eq!(slice_count(268849, 220980, "99999.jpg"), 10);
    }

    #[test]
    fn hashed_wide_range_is_even_and_bounded() {
        for album_id in [268850_i64, 300000, 421926] {
            for page in ["00001.jpg", "00002.jpg", "00037.webp"] {
                let count = slice_count(album_id, 220980, page);
                assert_eq!(count % 2, 0, "album {album_id} page {page}");
                assert!((2..=20).contains(&count), "album {album_id} page {page}");
            }
        }
    }

    #[test]
    fn hashed_narrow_range_is_even_and_bounded() {
        for album_id in [421927_i64, 500000, 1000000] {
            for page in ["00001.jpg", "00012.jpg", "00420.webp"] {
                let count = slice_count(album_id, 220980, page);
                assert_eq!(count % 2, 0, "album {album_id} page {page}");
                assert!((2..=16).contains(&count), "album {album_id} page {page}");
            }
        }
    }

    #[test]
    fn slice_count_is_deterministic() {
        let first = slice_count(500000, 220980, "00012.jpg");
        for _ in 0..10 {
            assert_eq!(slice_count(500000, 220980, "00012.jpg"), first);
        }
    }

    #[test]
    fn extension_is_stripped_before_hashing() {
        assert_eq!(
            slice_count(500000, 220980, "00012.jpg"),
            slice_count(500000, 220980, "00012.webp")
        );
    }

    #[test]
    fn animated_detection_is_case_insensitive() {
        assert!(is_animated("00001.gif"));
        assert!(is_animated("00001.GIF"));
        assert!(!is_animated("00001.jpg"));
        assert!(!is_animated("gif"));
        assert!(!is_animated("00001.gif.jpg"));
        assert!(!is_animated("画像"));
    }
}
