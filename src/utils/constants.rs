//! Constants Module - Single Source of Truth
//!
//! Chain ids, upstream endpoints, env var names and scanner defaults live
//! here. Other modules must not hardcode them.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("taxscan/", env!("CARGO_PKG_VERSION"));

// ============================================
// SCANNER DEFAULTS
// ============================================

/// Fee percentage above which `max_fee_over_cap` fires
pub const DEFAULT_FEE_CAP_PCT: f64 = 25.0;

/// Report cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

/// Largest accepted source or bytecode input
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 2 * 1024 * 1024;

/// Where telemetry exports land
pub const DEFAULT_TELEMETRY_DIR: &str = "./telemetry";

/// Fee denominator assumed when the contract never divides a fee
pub const DEFAULT_FEE_DENOMINATOR: u64 = 100;

/// Default timeout for RPC and explorer requests (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// API bind address
pub const DEFAULT_API_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: u16 = 8080;

// ============================================
// ENVIRONMENT VARIABLES
// ============================================

pub const ENV_ETHERSCAN_API_KEY: &str = "ETHERSCAN_API_KEY";
pub const ENV_RPC_URL: &str = "TAXSCAN_RPC_URL";
pub const ENV_EXPLORER_URL: &str = "TAXSCAN_EXPLORER_URL";
pub const ENV_MODEL: &str = "TAXSCAN_MODEL";
pub const ENV_FEE_CAP_PCT: &str = "TAXSCAN_FEE_CAP_PCT";
pub const ENV_CACHE_TTL_SECS: &str = "TAXSCAN_CACHE_TTL_SECS";
pub const ENV_MAX_SOURCE_BYTES: &str = "TAXSCAN_MAX_SOURCE_BYTES";
pub const ENV_TELEMETRY_DIR: &str = "TAXSCAN_TELEMETRY_DIR";
pub const ENV_API_KEYS: &str = "TAXSCAN_API_KEYS";
pub const ENV_API_HOST: &str = "TAXSCAN_HOST";
pub const ENV_API_PORT: &str = "TAXSCAN_PORT";

// ============================================
// CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Polygon
pub const CHAIN_ID_POLYGON: u64 = 137;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Optimism
pub const CHAIN_ID_OPTIMISM: u64 = 10;
/// Avalanche C-Chain
pub const CHAIN_ID_AVALANCHE: u64 = 43114;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

/// All supported EVM chain IDs
pub const SUPPORTED_CHAIN_IDS: [u64; 7] = [
    CHAIN_ID_ETHEREUM,
    CHAIN_ID_BSC,
    CHAIN_ID_POLYGON,
    CHAIN_ID_ARBITRUM,
    CHAIN_ID_OPTIMISM,
    CHAIN_ID_AVALANCHE,
    CHAIN_ID_BASE,
];

// ============================================
// UPSTREAM ENDPOINTS
// ============================================

/// Etherscan V2 unified API (one key, `chainid` selects the network)
pub const ETHERSCAN_V2_URL: &str = "https://api.etherscan.io/v2/api";

/// Get public RPC fallback URL for a chain
pub fn get_public_rpc_fallback(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("https://eth.llamarpc.com"),
        CHAIN_ID_BSC => Some("https://bsc-dataseed.binance.org"),
        CHAIN_ID_POLYGON => Some("https://polygon-rpc.com"),
        CHAIN_ID_ARBITRUM => Some("https://arb1.arbitrum.io/rpc"),
        CHAIN_ID_OPTIMISM => Some("https://mainnet.optimism.io"),
        CHAIN_ID_AVALANCHE => Some("https://api.avax.network/ext/bc/C/rpc"),
        CHAIN_ID_BASE => Some("https://mainnet.base.org"),
        _ => None,
    }
}

/// Env var holding a private RPC endpoint for a chain
pub fn get_rpc_env_var(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("ETH_HTTP_URL"),
        CHAIN_ID_BSC => Some("BSC_HTTP_URL"),
        CHAIN_ID_POLYGON => Some("POLYGON_HTTP_URL"),
        CHAIN_ID_ARBITRUM => Some("ARBITRUM_HTTP_URL"),
        CHAIN_ID_OPTIMISM => Some("OPTIMISM_HTTP_URL"),
        CHAIN_ID_AVALANCHE => Some("AVALANCHE_HTTP_URL"),
        CHAIN_ID_BASE => Some("BASE_HTTP_URL"),
        _ => None,
    }
}

// ============================================
// CHAIN METADATA
// ============================================

/// Get chain name
pub fn get_chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "Ethereum",
        CHAIN_ID_BSC => "BNB Smart Chain",
        CHAIN_ID_POLYGON => "Polygon",
        CHAIN_ID_ARBITRUM => "Arbitrum One",
        CHAIN_ID_OPTIMISM => "Optimism",
        CHAIN_ID_AVALANCHE => "Avalanche C-Chain",
        CHAIN_ID_BASE => "Base",
        _ => "Unknown",
    }
}

/// Get block explorer URL (for links in reports)
pub fn get_explorer_url(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "https://etherscan.io",
        CHAIN_ID_BSC => "https://bscscan.com",
        CHAIN_ID_POLYGON => "https://polygonscan.com",
        CHAIN_ID_ARBITRUM => "https://arbiscan.io",
        CHAIN_ID_OPTIMISM => "https://optimistic.etherscan.io",
        CHAIN_ID_AVALANCHE => "https://snowtrace.io",
        CHAIN_ID_BASE => "https://basescan.org",
        _ => "https://etherscan.io",
    }
}

/// Check if chain ID is supported
#[inline]
pub fn is_chain_supported(chain_id: u64) -> bool {
    SUPPORTED_CHAIN_IDS.contains(&chain_id)
}
