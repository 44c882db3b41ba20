use crate::models::Capabilities;
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims of a capability token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    pub exp: usize,
    pub jti: String,
}

/// Description of the principal a token is minted for.
#[derive(Debug, Clone)]
pub struct TokenSubject<'a> {
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub group_name: Option<&'a str>,
    pub capabilities: Capabilities,
}

pub fn create_jwt(subject: &TokenSubject<'_>, secret: &str, ttl_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| anyhow::anyhow!("token expiration overflows"))?
        .timestamp();

    let claims = Claims {
        sub: subject.user_id.to_owned(),
        name: subject.user_name.to_owned(),
        group: subject.group_name.map(str::to_owned),
        capabilities: subject.capabilities,
        exp: expiration as usize,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_cycle() {
        let secret = "test_secret";
        let subject = TokenSubject {
            user_id: "user_123",
            user_name: "alice",
            group_name: Some("producers"),
            capabilities: Capabilities {
                read: true,
                write: true,
                execute: false,
            },
        };
        let token = create_jwt(&subject, secret, 1).unwrap();
        let claims = validate_jwt(&token, secret).unwrap();
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.group.as_deref(), Some("producers"));
        assert!(claims.capabilities.write);
        assert!(!claims.capabilities.execute);
    }

    #[test]
    fn test_jwt_wrong_secret() {
        let subject = TokenSubject {
            user_id: "1",
            user_name: "bob",
            group_name: None,
            capabilities: Capabilities::ALL,
        };
        let token = create_jwt(&subject, "one", 1).unwrap();
        assert!(validate_jwt(&token, "two").is_err());
    }
}
