use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};

use crate::database::manager::DatabaseManager;
use crate::database::models::{
    EstadoLead, FuenteLead, InteraccionLead, Lead, PedidoPublico, StorefrontUser, TipoInteraccion, User,
};
use crate::database::Repository;
use crate::filter::FilterData;
use crate::services::{check_choice, opt_decimal, opt_i64, opt_str, required_str, ServiceError, ServiceResult};

/// Leads touched within this window count as active
const ACTIVE_WINDOW_DAYS: i64 = 30;
const RECENT_LIMIT: i32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct UltimaInteraccion {
    pub tipo: String,
    pub fecha: DateTime<Utc>,
    pub descripcion: String,
}

#[derive(Debug, Serialize)]
pub struct LeadView {
    #[serde(flatten)]
    pub lead: Lead,
    pub estado_display: String,
    pub interacciones: Vec<InteraccionLead>,
    pub ultima_interaccion: Option<UltimaInteraccion>,
}

#[derive(Debug, Serialize)]
pub struct LeadMetrics {
    pub total_leads: i64,
    pub leads_por_estado: BTreeMap<String, i64>,
    pub valor_total_pipeline: Decimal,
    pub leads_activos: i64,
    pub valor_total_compras: Decimal,
    pub promedio_compras: Decimal,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LeadEmail {
    pub nombre: String,
    pub email: String,
}

/// Average whole days between consecutive purchases, 0 below two purchases
pub fn purchase_frequency_days(fechas: &[DateTime<Utc>]) -> i32 {
    if fechas.len() < 2 {
        return 0;
    }
    let first = fechas.iter().min();
    let last = fechas.iter().max();
    match (first, last) {
        (Some(first), Some(last)) => {
            let days = (*last - *first).num_days();
            i32::try_from(days / (fechas.len() as i64 - 1)).unwrap_or(i32::MAX)
        }
        _ => 0,
    }
}

pub fn average_purchases(total_compras: i64, total_leads: i64) -> Decimal {
    if total_leads == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(total_compras) / Decimal::from(total_leads)).round_dp(2)
}

fn purchase_description(total: Decimal) -> String {
    format!("Compra realizada por valor de ${}", total)
}

pub struct LeadService {
    pool: PgPool,
}

impl LeadService {
    pub async fn new() -> ServiceResult<Self> {
        Ok(Self::with_pool(DatabaseManager::main_pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn repository(&self, tenant_id: i64) -> Repository<Lead> {
        Repository::new("leads", self.pool.clone()).scoped("tenant_id", tenant_id)
    }

    /// Tenant leads, optionally filtered by `estado`; `orden` is a column
    /// name with an optional leading `-`.
    pub async fn list(&self, tenant_id: i64, estado: Option<&str>, orden: Option<&str>) -> ServiceResult<Vec<LeadView>> {
        let where_clause = estado.filter(|e| !e.is_empty()).map(|e| json!({ "estado": e }));
        let order = orden.filter(|o| !o.is_empty()).unwrap_or("-fecha_creacion");
        let leads = self
            .repository(tenant_id)
            .select_any(FilterData {
                where_clause,
                order: Some(json!(order)),
                ..Default::default()
            })
            .await?;
        self.present(leads).await
    }

    async fn find(&self, tenant_id: i64, id: i64) -> ServiceResult<Lead> {
        self.repository(tenant_id)
            .select_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("No encontrado."))
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> ServiceResult<LeadView> {
        let lead = self.find(tenant_id, id).await?;
        self.present_one(lead).await
    }

    pub async fn create(&self, tenant_id: i64, tienda_id: Option<i64>, body: &Value) -> ServiceResult<LeadView> {
        let tienda_id = opt_i64(body, "tienda")
            .or(tienda_id)
            .ok_or_else(|| ServiceError::field("tienda", "Este campo es requerido."))?;
        self.check_store(tenant_id, tienda_id).await?;

        let nombre = required_str(body, "nombre")?;
        let email = required_str(body, "email")?;
        let estado = opt_str(body, "estado").unwrap_or_else(|| EstadoLead::Nuevo.as_str().to_string());
        check_choice("estado", &estado, &EstadoLead::values())?;
        let fuente = opt_str(body, "fuente").unwrap_or_else(|| FuenteLead::Manual.as_str().to_string());
        check_choice("fuente", &fuente, &FuenteLead::values())?;
        let probabilidad = Self::probability(body)?.unwrap_or(0);

        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (usuario_id, nombre, email, telefono, estado, notas, tenant_id, tienda_id,
                               valor_estimado, probabilidad, fuente)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(opt_i64(body, "usuario"))
        .bind(nombre)
        .bind(email)
        .bind(opt_str(body, "telefono").unwrap_or_default())
        .bind(estado)
        .bind(opt_str(body, "notas").unwrap_or_default())
        .bind(tenant_id)
        .bind(tienda_id)
        .bind(opt_decimal(body, "valor_estimado")?.unwrap_or_default())
        .bind(probabilidad)
        .bind(fuente)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Lead {} created for tenant {}", lead.id, tenant_id);
        self.present_one(lead).await
    }

    pub async fn update(&self, tenant_id: i64, id: i64, body: &Value) -> ServiceResult<LeadView> {
        let lead = self.find(tenant_id, id).await?;

        let nombre = match body.get("nombre") {
            Some(_) => Some(required_str(body, "nombre")?),
            None => None,
        };
        let email = match body.get("email") {
            Some(_) => Some(required_str(body, "email")?),
            None => None,
        };
        let estado = opt_str(body, "estado");
        if let Some(estado) = &estado {
            check_choice("estado", estado, &EstadoLead::values())?;
        }
        let fuente = opt_str(body, "fuente");
        if let Some(fuente) = &fuente {
            check_choice("fuente", fuente, &FuenteLead::values())?;
        }

        let lead = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads SET
                nombre = COALESCE($2, nombre),
                email = COALESCE($3, email),
                telefono = COALESCE($4, telefono),
                estado = COALESCE($5, estado),
                notas = COALESCE($6, notas),
                valor_estimado = COALESCE($7, valor_estimado),
                probabilidad = COALESCE($8, probabilidad),
                fuente = COALESCE($9, fuente),
                ultima_actualizacion = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(lead.id)
        .bind(nombre)
        .bind(email)
        .bind(opt_str(body, "telefono"))
        .bind(estado)
        .bind(opt_str(body, "notas"))
        .bind(opt_decimal(body, "valor_estimado")?)
        .bind(Self::probability(body)?)
        .bind(fuente)
        .fetch_one(&self.pool)
        .await?;
        self.present_one(lead).await
    }

    pub async fn delete(&self, tenant_id: i64, id: i64) -> ServiceResult<()> {
        let lead = self.find(tenant_id, id).await?;
        sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(lead.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Lead {} deleted", lead.id);
        Ok(())
    }

    pub async fn update_status(&self, tenant_id: i64, id: i64, estado: Option<&str>) -> ServiceResult<LeadView> {
        let lead = self.find(tenant_id, id).await?;
        let estado = estado
            .and_then(EstadoLead::parse)
            .ok_or_else(|| ServiceError::validation("Estado no válido"))?;
        let lead = sqlx::query_as::<_, Lead>(
            "UPDATE leads SET estado = $2, ultima_actualizacion = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(lead.id)
        .bind(estado.as_str())
        .fetch_one(&self.pool)
        .await?;
        self.present_one(lead).await
    }

    pub async fn metrics(&self, tenant_id: i64) -> ServiceResult<LeadMetrics> {
        let (total_leads, pipeline, compras, total_compras): (i64, Option<Decimal>, Option<Decimal>, Option<i64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), SUM(valor_estimado), SUM(valor_total_compras), SUM(total_compras)::BIGINT
                FROM leads WHERE tenant_id = $1
                "#,
            )
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;

        let counts: HashMap<String, i64> =
            sqlx::query_as::<_, (String, i64)>("SELECT estado, COUNT(*) FROM leads WHERE tenant_id = $1 GROUP BY estado")
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();
        let leads_por_estado = EstadoLead::ALL
            .iter()
            .map(|e| (e.as_str().to_string(), counts.get(e.as_str()).copied().unwrap_or(0)))
            .collect();

        let (leads_activos,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM leads WHERE tenant_id = $1 AND ultima_actualizacion >= $2")
                .bind(tenant_id)
                .bind(Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS))
                .fetch_one(&self.pool)
                .await?;

        Ok(LeadMetrics {
            total_leads,
            leads_por_estado,
            valor_total_pipeline: pipeline.unwrap_or_default(),
            leads_activos,
            valor_total_compras: compras.unwrap_or_default(),
            promedio_compras: average_purchases(total_compras.unwrap_or(0), total_leads),
        })
    }

    pub async fn recent(&self, tenant_id: i64) -> ServiceResult<Vec<LeadView>> {
        let leads = self
            .repository(tenant_id)
            .select_any(FilterData {
                order: Some(json!("-fecha_creacion")),
                limit: Some(RECENT_LIMIT),
                ..Default::default()
            })
            .await?;
        self.present(leads).await
    }

    pub async fn active(&self, tenant_id: i64) -> ServiceResult<Vec<LeadView>> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE tenant_id = $1 AND ultima_actualizacion >= $2 ORDER BY ultima_actualizacion DESC",
        )
        .bind(tenant_id)
        .bind(Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS))
        .fetch_all(&self.pool)
        .await?;
        self.present(leads).await
    }

    pub async fn emails(&self, tenant_id: i64) -> ServiceResult<Vec<LeadEmail>> {
        let emails = sqlx::query_as::<_, LeadEmail>("SELECT nombre, email FROM leads WHERE tenant_id = $1 ORDER BY id")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(emails)
    }

    // Interactions

    async fn find_for_interactions(&self, tenant_id: i64, lead_id: i64) -> ServiceResult<Lead> {
        self.repository(tenant_id)
            .select_id(lead_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lead no encontrado"))
    }

    pub async fn interactions(&self, tenant_id: i64, lead_id: i64) -> ServiceResult<Vec<InteraccionLead>> {
        let lead = self.find_for_interactions(tenant_id, lead_id).await?;
        let interacciones = sqlx::query_as::<_, InteraccionLead>(
            "SELECT * FROM interacciones_lead WHERE lead_id = $1 ORDER BY fecha DESC, id DESC",
        )
        .bind(lead.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(interacciones)
    }

    pub async fn add_interaction(&self, tenant_id: i64, lead_id: i64, body: &Value) -> ServiceResult<InteraccionLead> {
        let lead = self.find_for_interactions(tenant_id, lead_id).await?;
        for field in ["tipo", "descripcion"] {
            if body.get(field).and_then(Value::as_str).map_or(true, |s| s.is_empty()) {
                return Err(ServiceError::validation(format!("El campo '{}' es requerido", field)));
            }
        }
        let tipo = opt_str(body, "tipo").unwrap_or_default();
        let tipo = TipoInteraccion::parse(&tipo).ok_or_else(|| {
            ServiceError::validation(format!(
                "Tipo de interacción no válido. Debe ser uno de: {}",
                TipoInteraccion::values().join(", ")
            ))
        })?;
        let descripcion = opt_str(body, "descripcion").unwrap_or_default();
        let valor = opt_decimal(body, "valor")?;

        self.record_interaction(&lead, tipo, &descripcion, valor).await
    }

    /// Inserts an interaction, touches the lead and refreshes purchase
    /// metrics when the interaction is a valued purchase.
    async fn record_interaction(
        &self,
        lead: &Lead,
        tipo: TipoInteraccion,
        descripcion: &str,
        valor: Option<Decimal>,
    ) -> ServiceResult<InteraccionLead> {
        let mut tx = self.pool.begin().await?;
        let interaccion = sqlx::query_as::<_, InteraccionLead>(
            "INSERT INTO interacciones_lead (lead_id, tipo, descripcion, valor) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(lead.id)
        .bind(tipo.as_str())
        .bind(descripcion)
        .bind(valor)
        .fetch_one(&mut *tx)
        .await?;

        if tipo == TipoInteraccion::Compra && valor.is_some() {
            let fechas: Vec<(DateTime<Utc>,)> = sqlx::query_as(
                "SELECT fecha FROM interacciones_lead WHERE lead_id = $1 AND tipo = 'compra' AND valor IS NOT NULL",
            )
            .bind(lead.id)
            .fetch_all(&mut *tx)
            .await?;
            let fechas: Vec<DateTime<Utc>> = fechas.into_iter().map(|(f,)| f).collect();

            sqlx::query(
                r#"
                UPDATE leads SET
                    total_compras = total_compras + 1,
                    valor_total_compras = valor_total_compras + $2,
                    ultima_compra = $3,
                    frecuencia_compra = $4,
                    ultima_actualizacion = NOW()
                WHERE id = $1
                "#,
            )
            .bind(lead.id)
            .bind(valor.unwrap_or_default())
            .bind(interaccion.fecha)
            .bind(purchase_frequency_days(&fechas))
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE leads SET ultima_actualizacion = NOW() WHERE id = $1")
                .bind(lead.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(interaccion)
    }

    // Observer entry points

    /// Lead for a new account, attached to the first store of its tenant.
    /// Returns `None` when the tenant has no store yet.
    pub async fn lead_from_user(&self, user: &User) -> ServiceResult<Option<Lead>> {
        let Some(tenant_id) = user.tenant_id else {
            return Ok(None);
        };
        let tienda: Option<(i64,)> = sqlx::query_as("SELECT id FROM tiendas WHERE tenant_id = $1 ORDER BY id LIMIT 1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((tienda_id,)) = tienda else {
            return Ok(None);
        };

        let lead = self
            .insert_lead(Some(user.id), &user.display_name(), &user.email, tenant_id, tienda_id, FuenteLead::Manual)
            .await?;
        Ok(Some(lead))
    }

    pub async fn lead_from_storefront_user(&self, customer: &StorefrontUser) -> ServiceResult<Lead> {
        let tenant_id = self.store_tenant(customer.tienda_id).await?;
        let nombre = format!("{} {}", customer.first_name, customer.last_name);
        self.insert_lead(None, nombre.trim(), &customer.email, tenant_id, customer.tienda_id, FuenteLead::TiendaPublica)
            .await
    }

    /// Purchase interaction on the lead matching the order's email, creating
    /// the lead when the buyer is unknown to the tenant.
    pub async fn record_public_purchase(&self, pedido: &PedidoPublico) -> ServiceResult<Lead> {
        let tenant_id = self.store_tenant(pedido.tienda_id).await?;
        let existing = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE tenant_id = $1 AND email = $2 ORDER BY id LIMIT 1",
        )
        .bind(tenant_id)
        .bind(&pedido.correo)
        .fetch_optional(&self.pool)
        .await?;

        let lead = match existing {
            Some(lead) => lead,
            None => {
                let nombre = format!("{} {}", pedido.nombre, pedido.apellido);
                self.insert_lead(None, nombre.trim(), &pedido.correo, tenant_id, pedido.tienda_id, FuenteLead::Ecommerce)
                    .await?
            }
        };

        self.record_interaction(&lead, TipoInteraccion::Compra, &purchase_description(pedido.total), Some(pedido.total))
            .await?;
        self.find(tenant_id, lead.id).await
    }

    async fn insert_lead(
        &self,
        usuario_id: Option<i64>,
        nombre: &str,
        email: &str,
        tenant_id: i64,
        tienda_id: i64,
        fuente: FuenteLead,
    ) -> ServiceResult<Lead> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (usuario_id, nombre, email, estado, tenant_id, tienda_id, fuente)
            VALUES ($1, $2, $3, 'nuevo', $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(usuario_id)
        .bind(nombre)
        .bind(email)
        .bind(tenant_id)
        .bind(tienda_id)
        .bind(fuente.as_str())
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Lead {} created from {} source", lead.id, fuente);
        Ok(lead)
    }

    async fn store_tenant(&self, tienda_id: i64) -> ServiceResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT tenant_id FROM tiendas WHERE id = $1")
            .bind(tienda_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id,)| id).ok_or_else(|| ServiceError::not_found("Tienda no encontrada"))
    }

    async fn check_store(&self, tenant_id: i64, tienda_id: i64) -> ServiceResult<()> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tiendas WHERE id = $1 AND tenant_id = $2)")
            .bind(tienda_id)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(ServiceError::field(
                "tienda",
                format!("Clave primaria \"{}\" inválida - objeto no existe.", tienda_id),
            ));
        }
        Ok(())
    }

    fn probability(body: &Value) -> ServiceResult<Option<i32>> {
        match body.get("probabilidad").filter(|v| !v.is_null()) {
            None => Ok(None),
            Some(_) => {
                let value = opt_i64(body, "probabilidad")
                    .ok_or_else(|| ServiceError::field("probabilidad", "Un número entero válido es requerido."))?;
                if !(0..=100).contains(&value) {
                    return Err(ServiceError::field("probabilidad", "La probabilidad debe estar entre 0 y 100."));
                }
                Ok(Some(value as i32))
            }
        }
    }

    async fn present_one(&self, lead: Lead) -> ServiceResult<LeadView> {
        self.present(vec![lead])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::Internal("lead vanished while loading".to_string()))
    }

    async fn present(&self, leads: Vec<Lead>) -> ServiceResult<Vec<LeadView>> {
        let ids: Vec<i64> = leads.iter().map(|l| l.id).collect();
        let mut by_lead: HashMap<i64, Vec<InteraccionLead>> = HashMap::new();
        if !ids.is_empty() {
            let interacciones = sqlx::query_as::<_, InteraccionLead>(
                "SELECT * FROM interacciones_lead WHERE lead_id = ANY($1) ORDER BY fecha DESC, id DESC",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            for interaccion in interacciones {
                by_lead.entry(interaccion.lead_id).or_default().push(interaccion);
            }
        }

        Ok(leads
            .into_iter()
            .map(|lead| {
                let interacciones = by_lead.remove(&lead.id).unwrap_or_default();
                let ultima_interaccion = interacciones.first().map(|i| UltimaInteraccion {
                    tipo: i.tipo.clone(),
                    fecha: i.fecha,
                    descripcion: i.descripcion.clone(),
                });
                LeadView {
                    estado_display: EstadoLead::label_of(&lead.estado),
                    lead,
                    interacciones,
                    ultima_interaccion,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frequency_is_average_gap_in_days() {
        let d = |day| Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
        assert_eq!(purchase_frequency_days(&[]), 0);
        assert_eq!(purchase_frequency_days(&[d(1)]), 0);
        assert_eq!(purchase_frequency_days(&[d(1), d(11)]), 10);
        assert_eq!(purchase_frequency_days(&[d(21), d(1), d(11)]), 10);
    }

    #[test]
    fn average_purchases_is_zero_without_leads() {
        assert_eq!(average_purchases(0, 0), Decimal::ZERO);
        assert_eq!(average_purchases(7, 2), Decimal::new(350, 2));
    }

    #[test]
    fn purchase_description_shows_amount() {
        assert_eq!(purchase_description(Decimal::new(12550, 2)), "Compra realizada por valor de $125.50");
    }

    #[test]
    fn probability_is_bounded() {
        assert_eq!(LeadService::probability(&json!({"probabilidad": 40})).unwrap(), Some(40));
        assert_eq!(LeadService::probability(&json!({})).unwrap(), None);
        assert!(LeadService::probability(&json!({"probabilidad": 101})).is_err());
        assert!(LeadService::probability(&json!({"probabilidad": "x"})).is_err());
    }
}
