//! `s3://bucket/key` locations recorded in order and dataset items

use serde::{Deserialize, Serialize};

use crate::error::PointstoreError;

/// Parsed object location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/path/to/key`
    pub fn parse(uri: &str) -> Result<Self, PointstoreError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| PointstoreError::InvalidLocation(uri.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            },
            _ => Err(PointstoreError::InvalidLocation(uri.to_string())),
        }
    }

    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Public download URL for the object
    pub fn public_url(&self) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, self.key)
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl std::str::FromStr for S3Location {
    type Err = PointstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        S3Location::parse(s)
    }
}

impl TryFrom<String> for S3Location {
    type Error = PointstoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        S3Location::parse(&value)
    }
}

impl From<S3Location> for String {
    fn from(location: S3Location) -> Self {
        location.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let location = S3Location::parse("s3://order-pickup/6e49a131.csv").unwrap();
        assert_eq!(location.bucket, "order-pickup");
        assert_eq!(location.key, "6e49a131.csv");
        assert_eq!(location.to_string(), "s3://order-pickup/6e49a131.csv");
    }

    #[test]
    fn test_nested_key_and_file_name() {
        let location = S3Location::parse("s3://csb-data/csv/81447ffffffffff/a.csv").unwrap();
        assert_eq!(location.key, "csv/81447ffffffffff/a.csv");
        assert_eq!(location.file_name(), "a.csv");
    }

    #[test]
    fn test_public_url() {
        let location = S3Location::new("order-pickup", "abc.zip");
        assert_eq!(location.public_url(), "https://order-pickup.s3.amazonaws.com/abc.zip");
    }

    #[test]
    fn test_invalid_locations() {
        assert!(S3Location::parse("https://bucket/key").is_err());
        assert!(S3Location::parse("s3://bucket").is_err());
        assert!(S3Location::parse("s3:///key").is_err());
    }
}
