/// Large-cap sample used when no tickers are given on the command line.
/// Share classes use a dash (`BRK-B`), as the market data source expects.
pub const FALLBACK_SP500_SAMPLE: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "UNH", "JNJ", "JPM", "V",
    "PG", "XOM", "HD", "CVX", "MA", "ABBV", "MRK", "LLY", "PEP", "KO", "COST", "AVGO", "TMO",
    "WMT", "MCD", "CSCO", "ACN", "ABT", "DHR", "VZ", "NEE", "ADBE", "CMCSA", "TXN", "PM", "NKE",
    "WFC", "BMY", "UPS", "RTX", "ORCL", "HON", "QCOM", "COP", "LOW", "SPGI", "MS", "BA",
];

/// Tickers from a comma-separated flag, or the fallback sample when absent.
pub fn resolve_tickers(arg: Option<&str>) -> Vec<String> {
    match arg {
        Some(list) => list.split(',').map(str::to_string).collect(),
        None => FALLBACK_SP500_SAMPLE.iter().map(|t| t.to_string()).collect(),
    }
}
