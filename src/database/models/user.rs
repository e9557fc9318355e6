use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    Role {
        Admin => ("admin", "Administrador"),
        Vendedor => ("vendedor", "Vendedor"),
        Cliente => ("cliente", "Cliente"),
        Stock => ("stock", "Gestor de inventario"),
        Crm => ("crm", "Gestor CRM"),
        Marketing => ("marketing", "Marketing"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub tenant_id: Option<i64>,
    pub preferred_language: String,
    pub bio: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
    pub country: String,
    pub company_name: String,
    pub company_size: String,
    pub interest: String,
    pub profile_picture: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.is_staff || self.has_role(Role::Admin)
    }

    /// "first last" when either is set, otherwise the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name).trim().to_string();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            preferred_language: self.preferred_language.clone(),
            bio: self.bio.clone(),
            birth_date: self.birth_date,
            address: self.address.clone(),
            city: self.city.clone(),
            postal_code: self.postal_code.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            company_name: self.company_name.clone(),
            company_size: self.company_size.clone(),
            interest: self.interest.clone(),
            profile_picture: self.profile_picture.clone(),
            updated_at: self.updated_at,
            role: self.role.clone(),
            tenant_id: self.tenant_id,
        }
    }
}

/// Public representation of an account
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub preferred_language: String,
    pub bio: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
    pub country: String,
    pub company_name: String,
    pub company_size: String,
    pub interest: String,
    pub profile_picture: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub role: String,
    pub tenant_id: Option<i64>,
}
