//! HTTP client for the OPD REST API.
//!
//! Reads go through the [`QueryCache`]; writes invalidate the resource kinds they touch.
//! Every request carries the configured caller identity headers.

use api_shared::auth::{ROLE_HEADER, USER_ID_HEADER};
use api_shared::{
    AddOptionReq, ApiResponse, AuthContext, BulkPrescriptionReq, BulkPrescriptionRes,
    ClinicalProforma, ErrorRes, HealthRes, OptionList, Patient, PatientList, Prescription,
    PrescriptionList, ProformaInput, ProformaList, ProformaSaved,
};
use opd_core::constants::MAX_PAGE_LIMIT;
use opd_core::{
    ChangeBus, ChecklistField, OptionSet, PrescriptionSink, ProformaSink, RecordSource,
    ResourceKind, SourceError, SourceResult,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::error::{transport, ClientError, ClientResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Kinds touched by saving a proforma. A complex case may also open an ADL file and flag
/// the patient.
const PROFORMA_WRITE: &[ResourceKind] = &[
    ResourceKind::ClinicalProforma,
    ResourceKind::AdlFile,
    ResourceKind::Patient,
];

/// A page-able list payload.
trait Paged: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, u32);
}

impl Paged for ProformaList {
    type Item = ClinicalProforma;
    fn into_parts(self) -> (Vec<ClinicalProforma>, u32) {
        (self.proformas, self.pagination.pages)
    }
}

impl Paged for PrescriptionList {
    type Item = Prescription;
    fn into_parts(self) -> (Vec<Prescription>, u32) {
        (self.prescriptions, self.pagination.pages)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    identity: AuthContext,
    cache: Arc<QueryCache>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` if the base URL cannot carry a path, or
    /// `ClientError::Build` if the TLS backend cannot be initialised.
    pub fn new(cfg: &ClientConfig, bus: ChangeBus) -> ClientResult<Self> {
        let base_url = Url::parse(cfg.base_url())
            .map_err(|e| ClientError::InvalidConfig(format!("{}: {e}", cfg.base_url())))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base_url,
            identity: cfg.identity(),
            cache: Arc::new(QueryCache::new(bus).with_stale_after(cfg.cache_stale_after())),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn bus(&self) -> &ChangeBus {
        self.cache.bus()
    }

    /// The base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL can carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header(ROLE_HEADER, self.identity.role.as_str());
        if let Some(user_id) = self.identity.user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        builder
    }

    /// Sends the request and unwraps the `{ success, data }` envelope.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> SourceResult<T> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(status, response).await);
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    /// Serves a fresh cached response for `url`, else fetches and caches it.
    async fn get_cached<T>(&self, url: Url, tags: &[ResourceKind]) -> SourceResult<T>
    where
        T: DeserializeOwned + Serialize,
    {
        let key = url.as_str().to_string();
        if let Some(hit) = self.cache.get::<T>(&key) {
            return Ok(hit);
        }
        let value: T = self.send(self.request(Method::GET, url)).await?;
        self.cache.insert(&key, tags, &value);
        Ok(value)
    }

    async fn write<B, T>(
        &self,
        method: Method,
        url: Url,
        body: &B,
        touches: &[ResourceKind],
    ) -> SourceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let result = self.send(self.request(method, url).json(body)).await;
        // The server may have applied part of a failed write; drop what could be stale.
        self.cache.invalidate(touches);
        result
    }

    /// Follows `pagination.pages` until every item is read.
    async fn all_pages<L>(&self, base: Url, tags: &[ResourceKind]) -> SourceResult<Vec<L::Item>>
    where
        L: Paged + Serialize,
    {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("limit", &MAX_PAGE_LIMIT.to_string());
            let list: L = self.get_cached(url, tags).await?;
            let (chunk, pages) = list.into_parts();
            let done = chunk.is_empty() || page >= pages;
            items.extend(chunk);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }

    pub async fn health(&self) -> SourceResult<HealthRes> {
        let response = self
            .request(Method::GET, self.endpoint(["health"]))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(status, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// First page of active patients matching `search`.
    pub async fn search_patients(&self, search: Option<&str>) -> SourceResult<PatientList> {
        let mut builder = self
            .request(Method::GET, self.endpoint(["patients"]))
            .query(&[("limit", MAX_PAGE_LIMIT.to_string())]);
        if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
            builder = builder.query(&[("search", search.trim())]);
        }
        self.send(builder).await
    }

    pub async fn clinical_options(&self, field: ChecklistField) -> SourceResult<OptionSet> {
        let url = self.endpoint(["clinical-options", field.as_str()]);
        let list: OptionList = self
            .get_cached(url, &[ResourceKind::ClinicalOption])
            .await?;
        Ok(OptionSet::new(field, list.options))
    }

    pub async fn add_clinical_option(
        &self,
        field: ChecklistField,
        label: &str,
    ) -> SourceResult<OptionSet> {
        let list: OptionList = self
            .write(
                Method::POST,
                self.endpoint(["clinical-options", field.as_str()]),
                &AddOptionReq {
                    label: label.to_string(),
                },
                &[ResourceKind::ClinicalOption],
            )
            .await?;
        Ok(OptionSet::new(field, list.options))
    }

    pub async fn delete_clinical_option(
        &self,
        field: ChecklistField,
        label: &str,
    ) -> SourceResult<OptionSet> {
        let url = self.endpoint(["clinical-options", field.as_str(), label]);
        let result = self.send::<OptionList>(self.request(Method::DELETE, url)).await;
        self.cache.invalidate(&[ResourceKind::ClinicalOption]);
        Ok(OptionSet::new(field, result?.options))
    }
}

impl RecordSource for ApiClient {
    async fn patient(&self, id: i64) -> SourceResult<Patient> {
        self.get_cached(
            self.endpoint(["patients", id.to_string().as_str()]),
            &[ResourceKind::Patient],
        )
        .await
    }

    async fn proforma(&self, id: i64) -> SourceResult<ClinicalProforma> {
        self.get_cached(
            self.endpoint(["clinical-proforma", id.to_string().as_str()]),
            &[ResourceKind::ClinicalProforma],
        )
        .await
    }

    async fn proformas_for_patient(&self, patient_id: i64) -> SourceResult<Vec<ClinicalProforma>> {
        self.all_pages::<ProformaList>(
            self.endpoint(["clinical-proforma", "patient", patient_id.to_string().as_str()]),
            &[ResourceKind::ClinicalProforma],
        )
        .await
    }

    async fn prescriptions_for_proforma(&self, proforma_id: i64) -> SourceResult<Vec<Prescription>> {
        self.all_pages::<PrescriptionList>(
            self.endpoint(["prescriptions", "proforma", proforma_id.to_string().as_str()]),
            &[ResourceKind::Prescription, ResourceKind::ClinicalProforma],
        )
        .await
    }
}

impl PrescriptionSink for ApiClient {
    async fn create_bulk(&self, req: &BulkPrescriptionReq) -> SourceResult<BulkPrescriptionRes> {
        self.write(
            Method::POST,
            self.endpoint(["prescriptions", "bulk"]),
            req,
            &[ResourceKind::Prescription],
        )
        .await
    }
}

impl ProformaSink for ApiClient {
    async fn create_proforma(&self, input: &ProformaInput) -> SourceResult<ProformaSaved> {
        self.write(
            Method::POST,
            self.endpoint(["clinical-proforma"]),
            input,
            PROFORMA_WRITE,
        )
        .await
    }

    async fn update_proforma(&self, id: i64, input: &ProformaInput) -> SourceResult<ProformaSaved> {
        self.write(
            Method::PUT,
            self.endpoint(["clinical-proforma", id.to_string().as_str()]),
            input,
            PROFORMA_WRITE,
        )
        .await
    }
}

/// Turns a failed response into a `SourceError`, using the server's message when it sent one.
async fn error_from(status: StatusCode, response: Response) -> SourceError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorRes>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    if status == StatusCode::NOT_FOUND {
        SourceError::NotFound(message)
    } else {
        SourceError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{PatientInput, PrescriptionInput, Role, Sex, VisitType};
    use chrono::NaiveDate;
    use opd_core::{submit_bulk_prescriptions, Aggregator, Database, PatientRef, Services};

    async fn serve() -> (String, Services) {
        let services = Services::new(Database::open_in_memory().unwrap(), ChangeBus::new());
        let app = api_rest::router(api_rest::AppState::new(services.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), services)
    }

    fn client(base_url: &str, role: Role) -> ApiClient {
        let cfg = ClientConfig::new(base_url, AuthContext { role, user_id: None });
        ApiClient::new(&cfg, ChangeBus::new()).unwrap()
    }

    fn seed(services: &Services) -> (i64, i64) {
        let patient = services
            .patients
            .create(
                &PatientInput {
                    name: "Ravi Kumar".into(),
                    sex: Sex::Male,
                    age: Some(41),
                    contact_number: None,
                    cr_no: None,
                    psy_no: None,
                    assigned_room: None,
                    assigned_doctor_id: None,
                },
                None,
            )
            .unwrap();
        let saved = services
            .proformas
            .create(
                &ProformaInput {
                    patient_id: patient.id,
                    visit_date: NaiveDate::from_ymd_opt(2024, 3, 5),
                    visit_type: VisitType::FirstVisit,
                    ..ProformaInput::default()
                },
                None,
            )
            .unwrap();
        (patient.id, saved.proforma.id)
    }

    fn row(medicine: &str) -> PrescriptionInput {
        PrescriptionInput {
            medicine: medicine.into(),
            dosage: "1-0-1".into(),
            ..PrescriptionInput::default()
        }
    }

    #[test]
    fn test_endpoint_keeps_each_label_in_one_segment() {
        let api = client("http://opd.local", Role::Jr);
        let url = api.endpoint(["clinical-options", "mood", "Low mood/tearful"]);
        assert_eq!(
            url.as_str(),
            "http://opd.local/clinical-options/mood/Low%20mood%2Ftearful"
        );

        let api = client("https://opd.local/api/", Role::Jr);
        assert_eq!(
            api.endpoint(["patients", "7"]).as_str(),
            "https://opd.local/api/patients/7"
        );
    }

    #[test]
    fn test_rejects_base_url_without_path() {
        let cfg = ClientConfig::new(
            "mailto:opd@example.org",
            AuthContext {
                role: Role::Jr,
                user_id: None,
            },
        );
        assert!(matches!(
            ApiClient::new(&cfg, ChangeBus::new()),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_health_over_http() {
        let (base, _) = serve().await;
        let health = client(&base, Role::Jr).health().await.unwrap();
        assert!(health.ok);
    }

    #[tokio::test]
    async fn test_bulk_submit_then_aggregate_over_http() {
        let (base, services) = serve().await;
        let (patient_id, proforma_id) = seed(&services);
        let api = client(&base, Role::Jr);

        let res = submit_bulk_prescriptions(
            &api,
            Some(proforma_id),
            &[row("Sertraline"), PrescriptionInput::default(), row("Clonazepam")],
        )
        .await
        .unwrap();
        assert_eq!(res.count, 2);

        let view = Aggregator::new(api.clone())
            .aggregate(PatientRef::Proforma(proforma_id))
            .await
            .unwrap();
        assert_eq!(view.patient.id, patient_id);
        assert_eq!(view.prescriptions.len(), 2);
        assert_eq!(view.history.keys().collect::<Vec<_>>(), vec!["05 Mar 2024"]);
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_reads() {
        let (base, services) = serve().await;
        let (_, proforma_id) = seed(&services);
        let api = client(&base, Role::Sr);
        let mut changes = api.bus().subscribe_to(&[ResourceKind::Prescription]);

        assert!(api.prescriptions_for_proforma(proforma_id).await.unwrap().is_empty());
        assert!(!api.cache().is_empty());

        api.create_bulk(&BulkPrescriptionReq {
            clinical_proforma_id: proforma_id,
            prescriptions: vec![row("Lithium")],
        })
        .await
        .unwrap();

        assert_eq!(changes.recv().await.unwrap().kind, ResourceKind::Prescription);
        let rows = api.prescriptions_for_proforma(proforma_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item.medicine, "Lithium");
    }

    #[tokio::test]
    async fn test_expired_read_is_refetched() {
        let (base, services) = serve().await;
        let (patient_id, _) = seed(&services);
        let cfg = ClientConfig::new(
            &base,
            AuthContext {
                role: Role::Jr,
                user_id: None,
            },
        )
        .with_cache_stale_after(Duration::from_millis(200));
        let api = ApiClient::new(&cfg, ChangeBus::new()).unwrap();

        assert_eq!(api.patient(patient_id).await.unwrap().fields.name, "Ravi Kumar");

        // Another desk renames the patient; this client's bus never hears about it.
        let mut renamed = services.patients.get(patient_id).unwrap().fields;
        renamed.name = "Ravi K. Sharma".into();
        services.patients.update(patient_id, &renamed, None).unwrap();

        assert_eq!(api.patient(patient_id).await.unwrap().fields.name, "Ravi Kumar");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(api.patient(patient_id).await.unwrap().fields.name, "Ravi K. Sharma");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let (base, services) = serve().await;
        let (patient_id, _) = seed(&services);

        let err = client(&base, Role::Jr).patient(9999).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));

        let err = client(&base, Role::Mwo)
            .proformas_for_patient(patient_id)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 403, .. }));

        let err = client(&base, Role::Jr)
            .create_bulk(&BulkPrescriptionReq {
                clinical_proforma_id: 9999,
                prescriptions: vec![row("Lithium")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clinical_options_over_http() {
        let (base, _) = serve().await;
        let api = client(&base, Role::Jr);

        let before = api.clinical_options(ChecklistField::Mood).await.unwrap();
        let added = api
            .add_clinical_option(ChecklistField::Mood, "Low mood / tearful")
            .await
            .unwrap();
        assert!(added.contains("Low mood / tearful"));
        assert_eq!(added.labels().len(), before.labels().len() + 1);

        let removed = api
            .delete_clinical_option(ChecklistField::Mood, "Low mood / tearful")
            .await
            .unwrap();
        assert!(!removed.contains("Low mood / tearful"));
    }

    #[tokio::test]
    async fn test_live_history_follows_remote_submission() {
        let (base, services) = serve().await;
        let (patient_id, proforma_id) = seed(&services);
        let api = client(&base, Role::Jr);
        let mut live = crate::LiveVisitHistory::new(
            Aggregator::new(api.clone()),
            PatientRef::Patient(patient_id),
            api.bus(),
        );
        assert!(live.refresh().await.unwrap().prescriptions.is_empty());

        api.create_bulk(&BulkPrescriptionReq {
            clinical_proforma_id: proforma_id,
            prescriptions: vec![row("Olanzapine")],
        })
        .await
        .unwrap();

        let view = live.next_update().await.unwrap().unwrap();
        assert_eq!(view.prescriptions.len(), 1);
        assert_eq!(view.prescriptions[0].prescription.item.medicine, "Olanzapine");
    }
}
