use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::{DoctorError, DoctorService};
use shared_config::{AppConfig, SchedulingConfig};
use shared_database::{db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    CatalogError, CatalogStatistics, CreateServiceRequest, MedicalService, ServiceSearchQuery,
    UpdateServiceRequest,
};

pub struct CatalogService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    scheduling: SchedulingConfig,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            scheduling: config.scheduling.clone(),
        }
    }

    pub async fn create_service(
        &self,
        user: &User,
        request: CreateServiceRequest,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        require_admin(user)?;

        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CatalogError::ValidationError("Service name is required".to_string()));
        }
        if request.category.trim().is_empty() {
            return Err(CatalogError::ValidationError("Category is required".to_string()));
        }
        validate_price(request.price)?;
        self.validate_duration(request.duration_minutes)?;
        self.ensure_name_free(&name, None, auth_token).await?;

        let now = db_timestamp(Utc::now());
        let body = json!({
            "name": name,
            "slug": slugify(&name),
            "description": request.description,
            "category": request.category.trim().to_lowercase(),
            "price": request.price,
            "duration_minutes": request.duration_minutes,
            "is_active": true,
            "doctor_ids": [],
            "created_at": now,
            "updated_at": now
        });

        let service: MedicalService = self
            .supabase
            .insert("medical_services", body, Some(auth_token))
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        info!("Created medical service {} ({})", service.name, service.id);
        Ok(service)
    }

    pub async fn update_service(
        &self,
        user: &User,
        service_id: Uuid,
        request: UpdateServiceRequest,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        require_admin(user)?;
        let current = self.get_service(service_id, Some(auth_token)).await?;

        let mut update = Map::new();
        if let Some(name) = request.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(CatalogError::ValidationError("Service name is required".to_string()));
            }
            if name != current.name {
                self.ensure_name_free(&name, Some(service_id), auth_token).await?;
                update.insert("slug".to_string(), json!(slugify(&name)));
                update.insert("name".to_string(), json!(name));
            }
        }
        if let Some(description) = request.description {
            update.insert("description".to_string(), json!(description));
        }
        if let Some(category) = request.category {
            if category.trim().is_empty() {
                return Err(CatalogError::ValidationError("Category is required".to_string()));
            }
            update.insert("category".to_string(), json!(category.trim().to_lowercase()));
        }
        if let Some(price) = request.price {
            validate_price(price)?;
            update.insert("price".to_string(), json!(price));
        }
        if let Some(duration) = request.duration_minutes {
            self.validate_duration(duration)?;
            update.insert("duration_minutes".to_string(), json!(duration));
        }

        if update.is_empty() {
            return Ok(current);
        }

        self.patch(service_id, update, auth_token).await
    }

    /// Flips `is_active`.
    pub async fn toggle_status(
        &self,
        user: &User,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        require_admin(user)?;
        let current = self.get_service(service_id, Some(auth_token)).await?;

        let mut update = Map::new();
        update.insert("is_active".to_string(), json!(!current.is_active));
        let service = self.patch(service_id, update, auth_token).await?;

        info!("Service {} is_active = {}", service_id, service.is_active);
        Ok(service)
    }

    pub async fn assign_doctor(
        &self,
        user: &User,
        service_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        require_admin(user)?;
        let current = self.get_service(service_id, Some(auth_token)).await?;

        self.doctors
            .get_doctor(doctor_id, Some(auth_token))
            .await
            .map_err(|e| match e {
                DoctorError::NotFound => {
                    CatalogError::ValidationError(format!("Doctor {} does not exist", doctor_id))
                }
                other => CatalogError::DatabaseError(other.to_string()),
            })?;

        if current.doctor_ids.contains(&doctor_id) {
            return Ok(current);
        }

        let mut doctor_ids = current.doctor_ids;
        doctor_ids.push(doctor_id);

        let mut update = Map::new();
        update.insert("doctor_ids".to_string(), json!(doctor_ids));
        self.patch(service_id, update, auth_token).await
    }

    pub async fn remove_doctor(
        &self,
        user: &User,
        service_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        require_admin(user)?;
        let current = self.get_service(service_id, Some(auth_token)).await?;

        if !current.doctor_ids.contains(&doctor_id) {
            return Ok(current);
        }

        let doctor_ids: Vec<Uuid> = current
            .doctor_ids
            .into_iter()
            .filter(|id| *id != doctor_id)
            .collect();

        let mut update = Map::new();
        update.insert("doctor_ids".to_string(), json!(doctor_ids));
        self.patch(service_id, update, auth_token).await
    }

    pub async fn get_service(
        &self,
        service_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<MedicalService, CatalogError> {
        let path = Query::table("medical_services").eq("id", service_id).build();
        self.supabase
            .select_one::<MedicalService>(&path, auth_token)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?
            .ok_or(CatalogError::NotFound)
    }

    pub async fn list_active(&self, auth_token: Option<&str>) -> Result<Vec<MedicalService>, CatalogError> {
        let path = Query::table("medical_services")
            .eq("is_active", true)
            .order("name.asc")
            .build();
        self.fetch(&path, auth_token).await
    }

    pub async fn list_by_category(
        &self,
        category: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<MedicalService>, CatalogError> {
        let path = Query::table("medical_services")
            .eq("category", category.trim().to_lowercase())
            .eq("is_active", true)
            .order("name.asc")
            .build();
        self.fetch(&path, auth_token).await
    }

    /// Active services the doctor can perform, unrestricted ones included.
    pub async fn list_by_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<MedicalService>, CatalogError> {
        let services = self.list_active(auth_token).await?;
        Ok(services
            .into_iter()
            .filter(|s| s.is_offered_by(doctor_id))
            .collect())
    }

    pub async fn search_services(
        &self,
        search: &ServiceSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<MedicalService>, CatalogError> {
        if let (Some(min), Some(max)) = (search.min_price, search.max_price) {
            if min > max {
                return Err(CatalogError::ValidationError(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        let mut query = Query::table("medical_services").eq("is_active", true);
        if let Some(text) = search.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query = query.any_ilike(&["name", "description", "category"], text);
        }
        if let Some(min) = search.min_price {
            query = query.gte("price", min);
        }
        if let Some(max) = search.max_price {
            query = query.lte("price", max);
        }
        if let Some(max_duration) = search.max_duration {
            query = query.lte("duration_minutes", max_duration);
        }

        let path = query.order("name.asc").build();
        debug!("Searching services: {}", path);
        self.fetch(&path, auth_token).await
    }

    /// The service a booking may use: it exists, is active and is offered by
    /// the doctor.
    pub async fn validate_service_for_doctor(
        &self,
        service_id: Uuid,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<MedicalService, CatalogError> {
        let service = self.get_service(service_id, auth_token).await?;
        check_bookable(&service, doctor_id)?;
        Ok(service)
    }

    pub async fn statistics(&self, user: &User, auth_token: &str) -> Result<CatalogStatistics, CatalogError> {
        require_admin(user)?;
        let path = Query::table("medical_services").build();
        let services = self.fetch(&path, Some(auth_token)).await?;
        Ok(summarize(&services))
    }

    async fn fetch(&self, path: &str, auth_token: Option<&str>) -> Result<Vec<MedicalService>, CatalogError> {
        self.supabase
            .select(path, auth_token)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))
    }

    async fn patch(
        &self,
        service_id: Uuid,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<MedicalService, CatalogError> {
        update.insert("updated_at".to_string(), json!(db_timestamp(Utc::now())));

        let path = Query::table("medical_services").eq("id", service_id).build();
        let rows: Vec<MedicalService> = self
            .supabase
            .update(&path, Value::Object(update), Some(auth_token))
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(CatalogError::NotFound)
    }

    async fn ensure_name_free(
        &self,
        name: &str,
        except: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), CatalogError> {
        let path = Query::table("medical_services").eq("name", name).build();
        let existing = self.fetch(&path, Some(auth_token)).await?;

        if existing.iter().any(|s| Some(s.id) != except) {
            warn!("Duplicate service name rejected: {}", name);
            return Err(CatalogError::NameAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn validate_duration(&self, minutes: i64) -> Result<(), CatalogError> {
        let (min, max) = (
            self.scheduling.min_appointment_minutes,
            self.scheduling.max_appointment_minutes,
        );
        if minutes < min || minutes > max {
            return Err(CatalogError::ValidationError(format!(
                "Duration must be between {} and {} minutes",
                min, max
            )));
        }
        Ok(())
    }
}

fn require_admin(user: &User) -> Result<(), CatalogError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(CatalogError::Unauthorized)
    }
}

fn validate_price(price: f64) -> Result<(), CatalogError> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::ValidationError(
            "Price must be a non-negative amount".to_string(),
        ));
    }
    Ok(())
}

pub fn check_bookable(service: &MedicalService, doctor_id: Uuid) -> Result<(), CatalogError> {
    if !service.is_active {
        return Err(CatalogError::Inactive);
    }
    if !service.is_offered_by(doctor_id) {
        return Err(CatalogError::NotOfferedByDoctor);
    }
    Ok(())
}

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn summarize(services: &[MedicalService]) -> CatalogStatistics {
    let total = services.len();
    let active = services.iter().filter(|s| s.is_active).count();

    let average_price = if total == 0 {
        0.0
    } else {
        let sum: f64 = services.iter().map(|s| s.price).sum();
        (sum / total as f64 * 100.0).round() / 100.0
    };

    let mut by_category = BTreeMap::new();
    for service in services {
        *by_category.entry(service.category.clone()).or_insert(0) += 1;
    }

    CatalogStatistics {
        total,
        active,
        inactive: total - active,
        average_price,
        by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(category: &str, price: f64, active: bool, doctors: Vec<Uuid>) -> MedicalService {
        MedicalService {
            id: Uuid::new_v4(),
            name: "Check-up".to_string(),
            slug: "check-up".to_string(),
            description: None,
            category: category.to_string(),
            price,
            duration_minutes: 30,
            is_active: active,
            doctor_ids: doctors,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn slugs_are_dash_separated() {
        assert_eq!(slugify("General Consultation"), "general-consultation");
        assert_eq!(slugify("  X-Ray / Chest  "), "x-ray-chest");
        assert_eq!(slugify("ECG (12 leads)"), "ecg-12-leads");
    }

    #[test]
    fn statistics_count_and_average() {
        let services = vec![
            service("consultation", 50.0, true, vec![]),
            service("consultation", 70.0, false, vec![]),
            service("imaging", 120.5, true, vec![]),
        ];
        let stats = summarize(&services);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.average_price, 80.17);
        assert_eq!(stats.by_category.get("consultation"), Some(&2));
        assert_eq!(stats.by_category.get("imaging"), Some(&1));
    }

    #[test]
    fn empty_catalog_has_zero_average() {
        assert_eq!(summarize(&[]).average_price, 0.0);
    }

    #[test]
    fn restricted_services_need_the_doctor() {
        let doctor = Uuid::new_v4();
        let open = service("consultation", 50.0, true, vec![]);
        let restricted = service("imaging", 90.0, true, vec![Uuid::new_v4()]);
        let inactive = service("imaging", 90.0, false, vec![doctor]);

        assert_eq!(check_bookable(&open, doctor), Ok(()));
        assert_eq!(check_bookable(&restricted, doctor), Err(CatalogError::NotOfferedByDoctor));
        assert_eq!(check_bookable(&inactive, doctor), Err(CatalogError::Inactive));
    }

    #[test]
    fn prices_must_be_non_negative() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(-1.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
    }
}
