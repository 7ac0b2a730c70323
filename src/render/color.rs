use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color(&'static str);

impl Color {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub const PALETTE: [Color; 8] = [
    Color("#2196F3"),
    Color("#32c787"),
    Color("#00BCD4"),
    Color("#ff5652"),
    Color("#ffc107"),
    Color("#ff85af"),
    Color("#FF9800"),
    Color("#39bbb0"),
];

/// Avatar color for a name: `hash = 31 * hash + unit` over UTF-16 code units,
/// in double precision so the index matches the browser widget.
///
/// Names long enough to overflow to infinity land on the first entry.
pub fn color_for(identity: &str) -> Color {
    let hash = identity
        .encode_utf16()
        .fold(0f64, |hash, unit| 31.0 * hash + f64::from(unit));
    let index = (hash % PALETTE.len() as f64).abs() as usize;
    PALETTE[index.min(PALETTE.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_names_pick_expected_entries() {
        // "Alice" hashes to 63350368, which is 0 mod 8
        assert_eq!(color_for("Alice"), PALETTE[0]);
        // "Bob" hashes to 66965, which is 5 mod 8
        assert_eq!(color_for("Bob"), PALETTE[5]);
        assert_eq!(color_for(""), PALETTE[0]);
    }

    #[test]
    fn names_past_i32_range_keep_browser_colors() {
        // 71438467591 % 8 == 7
        assert_eq!(color_for("Michael"), PALETTE[7]);
        // 2137688699769 % 8 == 1
        assert_eq!(color_for("Jonathan"), PALETTE[1]);
        // 2128825339237 % 8 == 5
        assert_eq!(color_for("Jennifer"), PALETTE[5]);
        assert_eq!(color_for("Christopher"), PALETTE[0]);
    }

    #[test]
    fn huge_hashes_stay_in_range() {
        assert_eq!(color_for("a very long display name that overflows"), PALETTE[0]);
        assert_eq!(color_for(&"x".repeat(300)), PALETTE[0]);
    }

    proptest! {
        #[test]
        fn always_a_palette_entry(name in ".*") {
            prop_assert!(PALETTE.contains(&color_for(&name)));
        }

        #[test]
        fn deterministic(name in ".*") {
            prop_assert_eq!(color_for(&name), color_for(&name));
        }
    }
}
