use ztrack_game::{AccessibilityLevel, ItemCount};

pub fn tier_level(
    count: ItemCount,
    tiers: &[(ItemCount, AccessibilityLevel)],
) -> AccessibilityLevel {
    let mut level = AccessibilityLevel::None;
    for &(threshold, tier) in tiers {
        if count >= threshold {
            level = level.max(tier);
        }
    }
    level
}
