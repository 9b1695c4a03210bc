//! Name-based category dispatch.

use orbit_protocol::Category;

/// Lowercase substring patterns for a category, in match order.
///
/// [`Category::General`] has none; it is the fallback.
pub fn patterns(category: Category) -> &'static [&'static str] {
    match category {
        Category::Traits => &[
            "trait", "traits", "interfaces", "interface", "sip-009", "sip-010", "sip-013",
            "sip-018",
        ],
        Category::Utilities => &[
            "utils", "util", "helper", "library", "lib", "math", "string", "encoding", "crypto",
            "hash", "error", "constants", "types",
        ],
        Category::Tokens => &[
            "token", "ft", "nft", "fungible", "non-fungible", "mint", "burn", "transfer",
            "balance", "supply",
        ],
        Category::Defi => &[
            "dex", "swap", "pool", "liquidity", "amm", "router", "factory", "pair", "vault",
            "staking", "farming", "yield", "rewards",
        ],
        Category::Oracle => &[
            "oracle", "price", "feed", "aggregator", "adapter", "btc", "usd", "eth", "chainlink",
            "pyth",
        ],
        Category::Dao => &[
            "dao", "governance", "proposal", "vote", "voting", "timelock", "upgrade", "admin",
            "owner", "controller",
        ],
        Category::Security => &[
            "auth", "access", "control", "circuit", "breaker", "pause", "pausable", "rate",
            "limit", "emergency",
        ],
        Category::Testing => &["test", "mock", "fake", "simulator", "debug"],
        Category::General => &[],
    }
}

/// Picks the first category, in priority order, with a pattern contained in
/// the lowercased artifact name.
pub fn classify(name: &str) -> Category {
    let lower = name.to_ascii_lowercase();
    Category::ALL
        .into_iter()
        .find(|c| patterns(*c).iter().any(|p| lower.contains(p)))
        .unwrap_or(Category::General)
}
