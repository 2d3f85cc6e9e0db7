use crate::models::{SwapAvailability, TokenGroup};

/// Filter a token group by a case-insensitive substring of the asset name or symbol.
/// A blank query returns the group unchanged.
pub fn filter_tokens(query: &str, group: &TokenGroup) -> TokenGroup {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return TokenGroup {
            is_after_search: false,
            ..group.clone()
        };
    }

    let matches = |entry: &&SwapAvailability| {
        let asset = &entry.status.asset;
        asset.name.to_lowercase().contains(&query) || asset.symbol.to_lowercase().contains(&query)
    };

    TokenGroup {
        available: group.available.iter().filter(matches).cloned().collect(),
        unavailable: group.unavailable.iter().filter(matches).cloned().collect(),
        is_after_search: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, AssetStatus};

    fn entry(id: &str, symbol: &str, name: &str) -> SwapAvailability {
        SwapAvailability {
            status: AssetStatus::new(Asset::coin(id, symbol, name, 18, "ethereum"), None, None),
            providers: Vec::new(),
        }
    }

    fn group() -> TokenGroup {
        TokenGroup {
            available: vec![entry("eth", "ETH", "Ethereum"), entry("usdt", "USDT", "Tether")],
            unavailable: vec![entry("steth", "stETH", "Lido Staked Ether")],
            is_after_search: false,
        }
    }

    #[test]
    fn test_filter_matches_name_or_symbol() {
        let filtered = filter_tokens("ETH", &group());
        let available: Vec<_> = filtered
            .available
            .iter()
            .map(|e| e.status.asset.id.as_str())
            .collect();
        assert_eq!(available, vec!["eth", "usdt"]);
        assert_eq!(filtered.unavailable.len(), 1);
        assert!(filtered.is_after_search);
    }

    #[test]
    fn test_blank_query_returns_group() {
        let filtered = filter_tokens("   ", &group());
        assert_eq!(filtered, group());
    }

    #[test]
    fn test_no_match() {
        let filtered = filter_tokens("doge", &group());
        assert!(filtered.available.is_empty());
        assert!(filtered.unavailable.is_empty());
    }
}
