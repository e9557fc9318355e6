use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

choices! {
    PaymentType {
        Paypal => ("paypal", "PayPal"),
        Stripe => ("stripe", "Stripe"),
        CreditCard => ("credit_card", "Tarjeta de Crédito"),
        DebitCard => ("debit_card", "Tarjeta de Débito"),
        BankTransfer => ("bank_transfer", "Transferencia Bancaria"),
        Cash => ("cash", "Efectivo"),
        Crypto => ("crypto", "Criptomoneda"),
    }
}

choices! {
    PaymentMethodStatus {
        Active => ("active", "Activo"),
        Inactive => ("inactive", "Inactivo"),
        Pending => ("pending", "Pendiente"),
    }
}

choices! {
    TransactionStatus {
        Pending => ("pending", "Pendiente"),
        Completed => ("completed", "Completado"),
        Failed => ("failed", "Fallido"),
        Refunded => ("refunded", "Reembolsado"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: i64,
    pub tenant_id: i64,
    pub tienda_id: i64,
    pub name: String,
    pub payment_type: String,
    pub is_active: bool,
    pub status: String,
    pub credentials: serde_json::Value,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentTransaction {
    pub id: i64,
    pub tenant_id: i64,
    pub payment_method_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub transaction_id: String,
    pub payment_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub payment_method_name: Option<String>,
}
