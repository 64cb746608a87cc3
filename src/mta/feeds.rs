//! MTA GTFS-RT feed URL mapping.
//!
//! Each subway feed covers a group of routes:
//! `https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs{suffix}`

use std::collections::HashSet;

/// Base URL for MTA subway GTFS-RT feeds.
pub const MTA_FEED_BASE_URL: &str =
    "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs";

/// Returns the feed URL suffix for a given route.
pub fn feed_id_for_route(route: &str) -> Option<&'static str> {
    match route {
        // IRT: 1-6, 6X, GS
        "1" | "2" | "3" | "4" | "5" | "5X" | "6" | "6X" | "GS" => Some(""),
        // IRT: 7, 7X
        "7" | "7X" => Some("-7"),
        // IND: A, C, E, plus the Rockaway and Lefferts shuttles
        "A" | "C" | "E" | "H" | "FS" => Some("-ace"),
        // IND: B, D, F, M
        "B" | "D" | "F" | "FX" | "M" => Some("-bdfm"),
        "G" => Some("-g"),
        "J" | "Z" => Some("-jz"),
        "N" | "Q" | "R" | "W" => Some("-nqrw"),
        "L" => Some("-l"),
        "SI" | "SIR" => Some("-si"),
        _ => None,
    }
}

/// Returns deduplicated feed URLs for a set of routes, in first-seen order.
///
/// Routes with no known feed are returned separately so callers can reject them.
pub fn feed_urls_for_routes(routes: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut unknown = Vec::new();
    for route in routes {
        match feed_id_for_route(route) {
            Some(suffix) => {
                if seen.insert(suffix) {
                    urls.push(format!("{}{}", MTA_FEED_BASE_URL, suffix));
                }
            }
            None => unknown.push(route.clone()),
        }
    }
    (urls, unknown)
}
