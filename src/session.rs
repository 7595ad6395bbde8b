//! The requesting actor, passed explicitly into every workflow call
use crate::types::coded_enum;

coded_enum! {
    /// Role of the requesting actor. A property of the actor, never of the entity.
    pub enum Role {
        Administrador = (0, "ADMINISTRADOR"),
        Operador = (1, "OPERADOR"),
        Financeiro = (2, "FINANCEIRO"),
        // declared by the user directory, no transition grants it anything
        Aprovador = (3, "APROVADOR"),
    }
}

impl Role {
    /// Finance actors review, approve, reject and settle payments.
    pub fn is_finance(&self) -> bool {
        matches!(self, Role::Administrador | Role::Financeiro)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    pub display_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            role,
        }
    }
    /// Display name is the local part of the email, `maria.souza@acme.com` -> `maria.souza`.
    pub fn from_email(uid: impl Into<String>, email: &str, role: Role) -> Self {
        let local = email.split('@').next().unwrap_or(email).trim();
        let display_name = if local.is_empty() { email.trim() } else { local };
        Self::new(uid, display_name, role)
    }
}

/// Authenticated context of one request.
#[derive(Debug, Clone)]
pub struct Session {
    pub actor: Actor,
}

impl Session {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }
    pub fn uid(&self) -> &str {
        &self.actor.uid
    }
    pub fn role(&self) -> Role {
        self.actor.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_from_email() {
        let actor = Actor::from_email("u1", "maria.souza@acme.com.br", Role::Operador);
        assert_eq!(actor.display_name, "maria.souza");

        let actor = Actor::from_email("u2", "no-at-sign", Role::Financeiro);
        assert_eq!(actor.display_name, "no-at-sign");
    }

    #[test]
    fn role_codes_round_trip_through_parse() {
        for role in Role::ALL {
            assert_eq!(role.code().parse::<Role>().unwrap(), *role);
        }
        assert_eq!("financeiro".parse::<Role>().unwrap(), Role::Financeiro);
        assert!("GERENTE".parse::<Role>().is_err());
    }

    #[test]
    fn finance_roles() {
        assert!(Role::Administrador.is_finance());
        assert!(Role::Financeiro.is_finance());
        assert!(!Role::Operador.is_finance());
        assert!(!Role::Aprovador.is_finance());
    }
}
