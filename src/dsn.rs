/// Store location parsed from a DSN string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsnTarget {
    /// Server addresses in the order they appear in the DSN.
    pub servers: Vec<String>,
    /// Target collection name.
    pub collection: String,
}

/// Parse a DSN string into server addresses and a collection name.
///
/// Examples:
/// - "docstore://127.0.0.1:9200/logs"
/// - "docstore://node1:9200,node2:9200/logs"
/// - "https://search.internal:443/app-logs"
///
/// With the `docstore` scheme hosts are returned bare (`host:port`); with
/// `http`/`https` every host keeps the scheme so the client talks TLS when
/// asked to. Anything after `?` is ignored.
pub fn parse_dsn(dsn: &str) -> Result<DsnTarget, DsnError> {
    let (scheme, rest) = dsn.split_once("://").ok_or(DsnError::UnknownScheme)?;
    let scheme = scheme.to_ascii_lowercase();

    let prefix = match scheme.as_str() {
        "docstore" => "",
        "http" => "http://",
        "https" => "https://",
        _ => return Err(DsnError::UnknownScheme),
    };

    let rest = rest.split('?').next().unwrap_or(rest);
    let (hosts, collection) = rest.split_once('/').unwrap_or((rest, ""));

    let servers: Vec<String> = hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| format!("{}{}", prefix, h))
        .collect();
    if servers.is_empty() {
        return Err(DsnError::MissingHosts);
    }

    let collection = collection.trim_matches('/');
    if collection.is_empty() {
        return Err(DsnError::MissingCollection);
    }

    Ok(DsnTarget {
        servers,
        collection: collection.to_string(),
    })
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("DSN does not name any host")]
    MissingHosts,

    #[error("DSN does not name a collection")]
    MissingCollection,
}
