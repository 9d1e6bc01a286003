use crate::core::error::ValidationError;
use crate::models::peer::{AnnounceEvent, InfoHash, PeerId};
use crate::utils::hex::{decode_info_hash_param, url_decode};

/// Raw announce query values, still percent-encoded
#[derive(Debug, Default)]
pub struct AnnounceParams<'a> {
    pub info_hash: Option<&'a str>,
    pub peer_id: Option<&'a str>,
    pub port: Option<&'a str>,
    pub uploaded: Option<&'a str>,
    pub downloaded: Option<&'a str>,
    pub left: Option<&'a str>,
    pub event: Option<&'a str>,
    pub numwant: Option<&'a str>,
    pub ip: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAnnounceParams {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<AnnounceEvent>,
    pub numwant: Option<u32>,
}

impl<'a> AnnounceParams<'a> {
    /// Split a raw query string. Unknown keys are ignored; the last value wins.
    pub fn from_query(query: &'a str) -> Self {
        let mut params = Self::default();

        for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
            match key {
                "info_hash" => params.info_hash = Some(value),
                "peer_id" => params.peer_id = Some(value),
                "port" => params.port = Some(value),
                "uploaded" => params.uploaded = Some(value),
                "downloaded" => params.downloaded = Some(value),
                "left" => params.left = Some(value),
                "event" => params.event = Some(value),
                "numwant" => params.numwant = Some(value),
                "ip" => params.ip = Some(value),
                _ => {}
            }
        }

        params
    }

    pub fn validate(&self) -> Result<ValidatedAnnounceParams, ValidationError> {
        let info_hash = InfoHash(decode_fixed("info_hash", self.info_hash)?);
        let peer_id = PeerId(decode_fixed("peer_id", self.peer_id)?);

        let port = parse_number::<u16>("port", self.port)?;
        if port == 0 {
            return Err(ValidationError::OutOfRange("port"));
        }

        let numwant = match self.numwant {
            Some(value) if !value.is_empty() => Some(
                value
                    .parse::<u32>()
                    .map_err(|_| ValidationError::InvalidFormat("numwant"))?,
            ),
            _ => None,
        };

        Ok(ValidatedAnnounceParams {
            info_hash,
            peer_id,
            port,
            uploaded: parse_number("uploaded", self.uploaded)?,
            downloaded: parse_number("downloaded", self.downloaded)?,
            left: parse_number("left", self.left)?,
            event: parse_event(self.event.unwrap_or(""))?,
            numwant,
        })
    }
}

fn decode_fixed(field: &'static str, value: Option<&str>) -> Result<[u8; 20], ValidationError> {
    let value = value.ok_or(ValidationError::MissingParameter(field))?;
    let bytes = url_decode(value).map_err(|_| ValidationError::InvalidFormat(field))?;

    <[u8; 20]>::try_from(bytes.as_slice()).map_err(|_| ValidationError::InvalidLength {
        field,
        expected: 20,
        actual: bytes.len(),
    })
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<T, ValidationError> {
    let value = value.ok_or(ValidationError::MissingParameter(field))?;
    value.parse::<T>().map_err(|_| ValidationError::InvalidFormat(field))
}

/// `started`, `stopped`, `completed`; empty or `update` means a regular announce
pub fn parse_event(value: &str) -> Result<Option<AnnounceEvent>, ValidationError> {
    match value {
        "" | "update" => Ok(None),
        "started" => Ok(Some(AnnounceEvent::Started)),
        "stopped" => Ok(Some(AnnounceEvent::Stopped)),
        "completed" => Ok(Some(AnnounceEvent::Completed)),
        _ => Err(ValidationError::InvalidFormat("event")),
    }
}

/// Outcome of decoding one scrape `info_hash` value
pub type ScrapeHashParam<'a> = (&'a str, anyhow::Result<InfoHash>);

/// Every `info_hash` value in a scrape query, in order, each decoded independently
pub fn scrape_info_hashes(query: &str) -> Vec<ScrapeHashParam<'_>> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == "info_hash")
        .map(|(_, value)| (value, decode_info_hash_param(value).map(InfoHash)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "%12%34%56%78%9a%bc%de%f0%11%22%33%44%55%66%77%88%99%aa%bb%cc";
    const PEER: &str = "-qB4500-abcdefghijkl";

    fn query(extra: &str) -> String {
        format!(
            "info_hash={}&peer_id={}&port=6881&uploaded=1000&downloaded=0&left=0{}",
            HASH, PEER, extra
        )
    }

    #[test]
    fn test_validate_full_query() {
        let q = query("&event=started&numwant=30");
        let validated = AnnounceParams::from_query(&q).validate().unwrap();

        assert_eq!(validated.info_hash.0[0], 0x12);
        assert_eq!(&validated.peer_id.0, b"-qB4500-abcdefghijkl");
        assert_eq!(validated.port, 6881);
        assert_eq!(validated.uploaded, 1000);
        assert_eq!(validated.left, 0);
        assert_eq!(validated.event, Some(AnnounceEvent::Started));
        assert_eq!(validated.numwant, Some(30));
    }

    #[test]
    fn test_missing_event_is_regular_announce() {
        let q = query("");
        let validated = AnnounceParams::from_query(&q).validate().unwrap();
        assert_eq!(validated.event, None);
        assert_eq!(validated.numwant, None);
    }

    #[test]
    fn test_unknown_event_rejected() {
        let q = query("&event=exploded");
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::InvalidFormat("event"))
        ));
    }

    #[test]
    fn test_malformed_numbers_rejected() {
        let q = format!("info_hash={}&peer_id={}&port=6881&uploaded=abc&downloaded=0&left=0", HASH, PEER);
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::InvalidFormat("uploaded"))
        ));

        let q = format!("info_hash={}&peer_id={}&port=6881&uploaded=-5&downloaded=0&left=0", HASH, PEER);
        assert!(AnnounceParams::from_query(&q).validate().is_err());

        let q = format!("info_hash={}&peer_id={}&port=70000&uploaded=0&downloaded=0&left=0", HASH, PEER);
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::InvalidFormat("port"))
        ));
    }

    #[test]
    fn test_port_zero_rejected() {
        let q = format!("info_hash={}&peer_id={}&port=0&uploaded=0&downloaded=0&left=0", HASH, PEER);
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::OutOfRange("port"))
        ));
    }

    #[test]
    fn test_missing_parameter() {
        let q = format!("info_hash={}&port=6881&uploaded=0&downloaded=0&left=0", HASH);
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::MissingParameter("peer_id"))
        ));
    }

    #[test]
    fn test_short_info_hash_rejected() {
        let q = format!("info_hash=%12%34&peer_id={}&port=6881&uploaded=0&downloaded=0&left=0", PEER);
        assert!(matches!(
            AnnounceParams::from_query(&q).validate(),
            Err(ValidationError::InvalidLength { field: "info_hash", expected: 20, actual: 2 })
        ));
    }

    #[test]
    fn test_plus_in_peer_id_is_a_literal_byte() {
        let q = format!(
            "info_hash={}&peer_id=-qB4500-abcd+fghijk+&port=6881&uploaded=0&downloaded=0&left=0",
            HASH
        );
        let validated = AnnounceParams::from_query(&q).validate().unwrap();
        assert_eq!(&validated.peer_id.0, b"-qB4500-abcd+fghijk+");
    }

    #[test]
    fn test_ip_param_is_captured_raw() {
        let q = query("&ip=192.168.1.20");
        let params = AnnounceParams::from_query(&q);
        assert_eq!(params.ip, Some("192.168.1.20"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parse_event() {
        assert_eq!(parse_event("").unwrap(), None);
        assert_eq!(parse_event("update").unwrap(), None);
        assert_eq!(parse_event("completed").unwrap(), Some(AnnounceEvent::Completed));
        assert_eq!(parse_event("stopped").unwrap(), Some(AnnounceEvent::Stopped));
        assert!(parse_event("STOPPED").is_err());
    }

    #[test]
    fn test_scrape_info_hashes() {
        let q = format!(
            "info_hash={}&info_hash=0102030405060708090a0b0c0d0e0f1011121314&info_hash=bad&other=1",
            HASH
        );

        let hashes = scrape_info_hashes(&q);
        assert_eq!(hashes.len(), 3);
        assert!(hashes[0].1.is_ok());
        assert_eq!(hashes[1].1.as_ref().unwrap().0[0], 0x01);
        assert!(hashes[2].1.is_err());
        assert_eq!(hashes[2].0, "bad");
    }

    #[test]
    fn test_scrape_without_hashes() {
        assert!(scrape_info_hashes("").is_empty());
    }
}
