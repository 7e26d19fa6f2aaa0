// security/src/claims.rs

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::{Actor, Department, Role};

use crate::SecurityError;

/// Claims carried by an access token.
///
/// `sub` is the user account id. Doctors and patients act through their
/// profile record, so when `profile_id` is present it is the id the actor
/// is built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<Uuid>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    pub exp: u64,
    pub iat: u64,
}

impl Claims {
    pub fn for_actor(actor: &Actor, ttl: Duration) -> Self {
        let now = Utc::now();
        Claims {
            sub: actor.id(),
            profile_id: None,
            role: actor.role(),
            department: actor.department(),
            iat: now.timestamp().max(0) as u64,
            exp: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC).timestamp().max(0) as u64,
        }
    }

    pub fn into_actor(self) -> Result<Actor, SecurityError> {
        let id = self.profile_id.unwrap_or(self.sub);
        Actor::from_parts(id, self.role, self.department).map_err(|e| SecurityError::InvalidClaims(e.to_string()))
    }
}

pub fn issue_token(actor: &Actor, secret: &str, ttl: Duration) -> Result<String, SecurityError> {
    let claims = Claims::for_actor(actor, ttl);
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| SecurityError::Jwt(format!("Failed to encode JWT: {}", e)))
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, SecurityError> {
    let validation = Validation::default();
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| SecurityError::Jwt(format!("Failed to decode or validate JWT: {}", e)))
}

/// Decodes and validates `token`, then builds the actor it speaks for.
pub fn actor_from_token(token: &str, secret: &str) -> Result<Actor, SecurityError> {
    let claims = decode_claims(token, secret)?;
    log::debug!("Token accepted for subject {} as {}", claims.sub, claims.role);
    claims.into_actor()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trips_staff_department() {
        let actor = Actor::staff(Uuid::new_v4(), Department::Laboratory);
        let token = issue_token(&actor, SECRET, Duration::minutes(5)).unwrap();
        assert_eq!(actor_from_token(&token, SECRET).unwrap(), actor);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&Actor::doctor(Uuid::new_v4()), SECRET, Duration::minutes(5)).unwrap();
        assert!(matches!(actor_from_token(&token, "other"), Err(SecurityError::Jwt(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(&Actor::patient(Uuid::new_v4()), SECRET, Duration::hours(-2)).unwrap();
        assert!(actor_from_token(&token, SECRET).is_err());
    }

    #[test]
    fn unbounded_ttl_saturates_expiry() {
        let actor = Actor::staff(Uuid::new_v4(), Department::Cashier);
        let claims = Claims::for_actor(&actor, Duration::MAX);
        assert_eq!(claims.exp, DateTime::<Utc>::MAX_UTC.timestamp() as u64);
        let token = issue_token(&actor, SECRET, Duration::MAX).unwrap();
        assert_eq!(actor_from_token(&token, SECRET).unwrap(), actor);
    }

    #[test]
    fn profile_id_takes_precedence_over_subject() {
        let profile = Uuid::new_v4();
        let claims = Claims {
            profile_id: Some(profile),
            ..Claims::for_actor(&Actor::doctor(Uuid::new_v4()), Duration::minutes(5))
        };
        assert_eq!(claims.into_actor().unwrap(), Actor::doctor(profile));
    }

    #[test]
    fn department_on_patient_claims_is_invalid() {
        let mut claims = Claims::for_actor(&Actor::patient(Uuid::new_v4()), Duration::minutes(5));
        claims.department = Some(Department::Cashier);
        assert!(matches!(claims.into_actor(), Err(SecurityError::InvalidClaims(_))));
    }
}
