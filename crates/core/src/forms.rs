//! Clinical proforma form state.
//!
//! Checklist fields are edited as sets of option labels ([`MultiSelect`]) and written back
//! in their comma-joined stored form. Each checklist draws its labels from a shared,
//! field-scoped vocabulary that users can extend or prune ([`OptionSet`]).

use api_shared::{ClinicalProforma, DoctorDecision, ProformaInput, ProformaSaved, VisitType};
use chrono::NaiveDate;
use opd_types::{MultiSelect, NonEmptyText};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::error::{SourceResult, WorkflowError, WorkflowResult};

// ============================================================================
// CHECKLIST FIELDS
// ============================================================================

/// Every multi-select field on the clinical proforma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecklistField {
    Mood,
    Behaviour,
    Speech,
    Thought,
    Perception,
    Somatic,
    BioFunctions,
    Adjustment,
    CognitiveFunction,
    Fits,
    SexualProblem,
    SubstanceUse,
    AssociatedMedicalSurgical,
    MseBehaviour,
    MseAffect,
    MseThought,
    MsePerception,
    MseCognitiveFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown checklist field: {0}")]
pub struct UnknownChecklistField(pub String);

impl ChecklistField {
    pub const ALL: [ChecklistField; 18] = [
        ChecklistField::Mood,
        ChecklistField::Behaviour,
        ChecklistField::Speech,
        ChecklistField::Thought,
        ChecklistField::Perception,
        ChecklistField::Somatic,
        ChecklistField::BioFunctions,
        ChecklistField::Adjustment,
        ChecklistField::CognitiveFunction,
        ChecklistField::Fits,
        ChecklistField::SexualProblem,
        ChecklistField::SubstanceUse,
        ChecklistField::AssociatedMedicalSurgical,
        ChecklistField::MseBehaviour,
        ChecklistField::MseAffect,
        ChecklistField::MseThought,
        ChecklistField::MsePerception,
        ChecklistField::MseCognitiveFunction,
    ];

    /// Column name, also used as the vocabulary scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecklistField::Mood => "mood",
            ChecklistField::Behaviour => "behaviour",
            ChecklistField::Speech => "speech",
            ChecklistField::Thought => "thought",
            ChecklistField::Perception => "perception",
            ChecklistField::Somatic => "somatic",
            ChecklistField::BioFunctions => "bio_functions",
            ChecklistField::Adjustment => "adjustment",
            ChecklistField::CognitiveFunction => "cognitive_function",
            ChecklistField::Fits => "fits",
            ChecklistField::SexualProblem => "sexual_problem",
            ChecklistField::SubstanceUse => "substance_use",
            ChecklistField::AssociatedMedicalSurgical => "associated_medical_surgical",
            ChecklistField::MseBehaviour => "mse_behaviour",
            ChecklistField::MseAffect => "mse_affect",
            ChecklistField::MseThought => "mse_thought",
            ChecklistField::MsePerception => "mse_perception",
            ChecklistField::MseCognitiveFunction => "mse_cognitive_function",
        }
    }

    /// Labels seeded into the shared vocabulary on first start.
    pub fn default_options(&self) -> &'static [&'static str] {
        match self {
            ChecklistField::Mood => &["Anxious", "Sad", "Cheerful", "Agitated", "Fearful", "Irritable"],
            ChecklistField::Behaviour => &[
                "Suspiciousness",
                "Talking/Smiling to self",
                "Hallucinatory behaviour",
                "Increased goal-directed activity",
                "Compulsions",
                "Apathy",
                "Social withdrawal",
                "Aggression",
            ],
            ChecklistField::Speech => &["Irrelevant", "Incoherent", "Pressured", "Reduced", "Mutism"],
            ChecklistField::Thought => &[
                "Reference",
                "Persecution",
                "Grandiosity",
                "Love infidelity",
                "Bizarre",
                "Pessimism",
                "Worthlessness",
                "Guilt",
                "Hopelessness",
                "Suicidal ideas",
                "Obsessions",
            ],
            ChecklistField::Perception => &["Hearing voices", "Seeing images", "Sensory disturbances"],
            ChecklistField::Somatic => &["Pains", "Numbness", "Weakness", "Fatigue", "Tremors", "Palpitations"],
            ChecklistField::BioFunctions => &["Sleep", "Appetite", "Self-care"],
            ChecklistField::Adjustment => &["Work output", "Socialization"],
            ChecklistField::CognitiveFunction => &["Disorientation", "Inattention", "Impaired memory", "Intelligence"],
            ChecklistField::Fits => &["Epileptic", "Dissociative", "Mixed", "Not clear"],
            ChecklistField::SexualProblem => &["Dhat", "Poor erection", "Premature ejaculation", "Anxiety"],
            ChecklistField::SubstanceUse => &["Alcohol", "Opioid", "Cannabis", "Benzodiazepines", "Tobacco"],
            ChecklistField::AssociatedMedicalSurgical => &["Hypertension", "Diabetes", "Dyslipidemia", "Thyroid dysfunction"],
            ChecklistField::MseBehaviour => &["Uncooperative", "Unkempt", "Fearful", "Odd", "Suspicious", "Retarded", "Excited", "Aggressive", "Apathetic"],
            ChecklistField::MseAffect => &["Anxious", "Depressed", "Elevated", "Irritable", "Blunted", "Labile", "Inappropriate"],
            ChecklistField::MseThought => &["Depressive", "Suicidal", "Obsessions", "Hypochondriacal", "Preoccupations", "Worries"],
            ChecklistField::MsePerception => &["Hallucination - Auditory", "Hallucination - Visual", "Illusions", "Depersonalization"],
            ChecklistField::MseCognitiveFunction => &["Impaired orientation", "Impaired attention", "Impaired memory", "Impaired judgement"],
        }
    }
}

impl fmt::Display for ChecklistField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecklistField {
    type Err = UnknownChecklistField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChecklistField::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| UnknownChecklistField(s.to_string()))
    }
}

/// Selected labels of `field` within a proforma body.
pub fn checklist(input: &ProformaInput, field: ChecklistField) -> &MultiSelect {
    match field {
        ChecklistField::Mood => &input.mood,
        ChecklistField::Behaviour => &input.behaviour,
        ChecklistField::Speech => &input.speech,
        ChecklistField::Thought => &input.thought,
        ChecklistField::Perception => &input.perception,
        ChecklistField::Somatic => &input.somatic,
        ChecklistField::BioFunctions => &input.bio_functions,
        ChecklistField::Adjustment => &input.adjustment,
        ChecklistField::CognitiveFunction => &input.cognitive_function,
        ChecklistField::Fits => &input.fits,
        ChecklistField::SexualProblem => &input.sexual_problem,
        ChecklistField::SubstanceUse => &input.substance_use,
        ChecklistField::AssociatedMedicalSurgical => &input.associated_medical_surgical,
        ChecklistField::MseBehaviour => &input.mse_behaviour,
        ChecklistField::MseAffect => &input.mse_affect,
        ChecklistField::MseThought => &input.mse_thought,
        ChecklistField::MsePerception => &input.mse_perception,
        ChecklistField::MseCognitiveFunction => &input.mse_cognitive_function,
    }
}

pub fn checklist_mut(input: &mut ProformaInput, field: ChecklistField) -> &mut MultiSelect {
    match field {
        ChecklistField::Mood => &mut input.mood,
        ChecklistField::Behaviour => &mut input.behaviour,
        ChecklistField::Speech => &mut input.speech,
        ChecklistField::Thought => &mut input.thought,
        ChecklistField::Perception => &mut input.perception,
        ChecklistField::Somatic => &mut input.somatic,
        ChecklistField::BioFunctions => &mut input.bio_functions,
        ChecklistField::Adjustment => &mut input.adjustment,
        ChecklistField::CognitiveFunction => &mut input.cognitive_function,
        ChecklistField::Fits => &mut input.fits,
        ChecklistField::SexualProblem => &mut input.sexual_problem,
        ChecklistField::SubstanceUse => &mut input.substance_use,
        ChecklistField::AssociatedMedicalSurgical => &mut input.associated_medical_surgical,
        ChecklistField::MseBehaviour => &mut input.mse_behaviour,
        ChecklistField::MseAffect => &mut input.mse_affect,
        ChecklistField::MseThought => &mut input.mse_thought,
        ChecklistField::MsePerception => &mut input.mse_perception,
        ChecklistField::MseCognitiveFunction => &mut input.mse_cognitive_function,
    }
}

// ============================================================================
// OPTION VOCABULARY
// ============================================================================

/// The option labels offered for one checklist field, deduplicated, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    field: ChecklistField,
    labels: Vec<String>,
}

impl OptionSet {
    pub fn new<I, S>(field: ChecklistField, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            field,
            labels: Vec::new(),
        };
        for label in labels {
            set.add(label.as_ref());
        }
        set
    }

    pub fn with_defaults(field: ChecklistField) -> Self {
        Self::new(field, field.default_options())
    }

    pub fn field(&self) -> ChecklistField {
        self.field
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label.trim())
    }

    /// Adds a label. Blank, comma-holding and already-present labels are ignored; returns
    /// whether it was added.
    pub fn add(&mut self, label: &str) -> bool {
        let Some(label) = NonEmptyText::from_optional(Some(label)) else {
            return false;
        };
        if !MultiSelect::is_storable_label(label.as_str()) || self.contains(label.as_str()) {
            return false;
        }
        self.labels.push(label.into_inner());
        true
    }

    pub fn remove(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label.trim());
        self.labels.len() != before
    }
}

// ============================================================================
// FORM STATE
// ============================================================================

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors(BTreeMap<String, String>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn first(&self) -> Option<(&str, &str)> {
        self.0.iter().next().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Editing state for creating or updating a clinical proforma.
#[derive(Debug, Clone, PartialEq)]
pub struct ProformaForm {
    input: ProformaInput,
    existing_id: Option<i64>,
}

impl ProformaForm {
    /// Blank form for a new visit on `visit_date`.
    pub fn new(patient_id: i64, visit_date: NaiveDate, visit_type: VisitType) -> Self {
        Self {
            input: ProformaInput {
                patient_id,
                visit_date: Some(visit_date),
                visit_type,
                ..ProformaInput::default()
            },
            existing_id: None,
        }
    }

    /// Form pre-filled from a stored proforma. Checklists arrive already normalised.
    pub fn from_existing(proforma: &ClinicalProforma) -> Self {
        Self {
            input: proforma.fields.clone(),
            existing_id: Some(proforma.id),
        }
    }

    pub fn existing_id(&self) -> Option<i64> {
        self.existing_id
    }

    pub fn input(&self) -> &ProformaInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut ProformaInput {
        &mut self.input
    }

    pub fn selected(&self, field: ChecklistField) -> &MultiSelect {
        checklist(&self.input, field)
    }

    /// Selects `label`. A label holding a comma cannot be stored and is refused.
    pub fn select(&mut self, field: ChecklistField, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || !MultiSelect::is_storable_label(label) {
            return false;
        }
        checklist_mut(&mut self.input, field).insert(label)
    }

    pub fn deselect(&mut self, field: ChecklistField, label: &str) -> bool {
        checklist_mut(&mut self.input, field).remove(label.trim())
    }

    pub fn toggle(&mut self, field: ChecklistField, label: &str) -> bool {
        checklist_mut(&mut self.input, field).toggle(label.trim())
    }

    /// Adds a new label to the field's vocabulary and selects it.
    pub fn add_option(&mut self, options: &mut OptionSet, label: &str) {
        options.add(label);
        if options.contains(label) {
            self.select(options.field(), label);
        }
    }

    /// Deletes a label from the vocabulary, deselecting it if it was selected.
    pub fn remove_option(&mut self, options: &mut OptionSet, label: &str) {
        options.remove(label);
        self.deselect(options.field(), label);
    }

    /// Sets the doctor's decision. A complex case always requires an ADL file; moving back
    /// to a simple case keeps whatever reasoning was already typed.
    pub fn set_doctor_decision(&mut self, decision: Option<DoctorDecision>) {
        self.input.doctor_decision = decision;
        if decision == Some(DoctorDecision::ComplexCase) {
            self.input.requires_adl_file = true;
        }
    }

    pub fn adl_reasoning_required(&self) -> bool {
        self.input.doctor_decision == Some(DoctorDecision::ComplexCase)
    }

    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();

        if self.input.patient_id <= 0 {
            errors.insert("patient_id", "Select a patient");
        }
        if self.input.visit_date.is_none() {
            errors.insert("visit_date", "Visit date is required");
        }
        if self.adl_reasoning_required()
            && NonEmptyText::from_optional(self.input.adl_reasoning.as_deref()).is_none()
        {
            errors.insert(
                "adl_reasoning",
                "Reason for ADL file is required for complex cases",
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates and returns the request body. The form itself is left untouched.
    pub fn to_request(&self) -> Result<ProformaInput, FormErrors> {
        self.validate()?;
        Ok(self.input.clone())
    }
}

/// Write side for proformas, implemented by the HTTP client.
pub trait ProformaSink {
    fn create_proforma(
        &self,
        input: &ProformaInput,
    ) -> impl Future<Output = SourceResult<ProformaSaved>> + Send;

    fn update_proforma(
        &self,
        id: i64,
        input: &ProformaInput,
    ) -> impl Future<Output = SourceResult<ProformaSaved>> + Send;
}

/// Validates the form and, only if it is valid, creates or updates the proforma.
///
/// # Errors
///
/// - `WorkflowError::Validation` if any field is invalid; the sink is not called.
/// - `WorkflowError::Source` if the sink fails.
pub async fn submit_proforma<S: ProformaSink>(
    form: &ProformaForm,
    sink: &S,
) -> WorkflowResult<ProformaSaved> {
    let input = form.to_request().map_err(WorkflowError::Validation)?;

    let saved = match form.existing_id() {
        Some(id) => sink.update_proforma(id, &input).await?,
        None => sink.create_proforma(&input).await?,
    };

    tracing::info!(
        proforma_id = saved.proforma.id,
        patient_id = input.patient_id,
        "proforma submitted"
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn saved(id: i64, input: &ProformaInput) -> ProformaSaved {
            ProformaSaved {
                proforma: ClinicalProforma {
                    id,
                    fields: input.clone(),
                    adl_file_id: None,
                    patient_name: None,
                    doctor_name: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                adl_file: None,
            }
        }
    }

    impl ProformaSink for CountingSink {
        async fn create_proforma(&self, input: &ProformaInput) -> SourceResult<ProformaSaved> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::saved(1, input))
        }

        async fn update_proforma(
            &self,
            id: i64,
            input: &ProformaInput,
        ) -> SourceResult<ProformaSaved> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::saved(id, input))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn existing_simple_case() -> ClinicalProforma {
        ClinicalProforma {
            id: 42,
            fields: ProformaInput {
                patient_id: 7,
                visit_date: Some(date(2024, 1, 10)),
                doctor_decision: Some(DoctorDecision::SimpleCase),
                mood: MultiSelect::from_stored("Anxious, Sad"),
                ..ProformaInput::default()
            },
            adl_file_id: None,
            patient_name: None,
            doctor_name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in ChecklistField::ALL {
            assert_eq!(field.as_str().parse::<ChecklistField>().unwrap(), field);
            assert!(!field.default_options().is_empty());
        }
        assert!("hobbies".parse::<ChecklistField>().is_err());
    }

    #[test]
    fn test_adding_same_option_twice_keeps_one() {
        let mut options = OptionSet::with_defaults(ChecklistField::Mood);
        let before = options.labels().len();

        assert!(options.add("Euphoric"));
        assert!(!options.add("Euphoric"));
        assert!(!options.add("  Euphoric "));

        assert_eq!(options.labels().len(), before + 1);
        assert_eq!(
            options.labels().iter().filter(|l| *l == "Euphoric").count(),
            1
        );
    }

    #[test]
    fn test_comma_label_is_neither_offered_nor_selected() {
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        let mut options = OptionSet::with_defaults(ChecklistField::Mood);
        let before = options.labels().len();

        form.add_option(&mut options, "Low, tearful");

        assert_eq!(options.labels().len(), before);
        assert!(!form.selected(ChecklistField::Mood).contains("Low"));
        assert!(!form.select(ChecklistField::Mood, "Low, tearful"));
        assert_eq!(form.selected(ChecklistField::Mood).as_slice(), ["Anxious", "Sad"]);
    }

    #[test]
    fn test_option_set_dedupes_initial_labels() {
        let options = OptionSet::new(ChecklistField::Fits, ["Epileptic", "Epileptic", " ", "Mixed"]);
        assert_eq!(options.labels(), ["Epileptic", "Mixed"]);
    }

    #[test]
    fn test_removing_selected_option_deselects_it() {
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        let mut options = OptionSet::with_defaults(ChecklistField::Mood);
        assert!(form.selected(ChecklistField::Mood).contains("Sad"));

        form.remove_option(&mut options, "Sad");

        assert!(!options.contains("Sad"));
        assert_eq!(form.selected(ChecklistField::Mood).as_slice(), ["Anxious"]);
    }

    #[test]
    fn test_added_option_is_selected() {
        let mut form = ProformaForm::new(7, date(2024, 1, 10), VisitType::FirstVisit);
        let mut options = OptionSet::with_defaults(ChecklistField::SubstanceUse);

        form.add_option(&mut options, "Inhalants");

        assert!(options.contains("Inhalants"));
        assert!(form.selected(ChecklistField::SubstanceUse).contains("Inhalants"));
    }

    #[test]
    fn test_complex_case_checks_requires_adl_file() {
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        assert!(!form.input().requires_adl_file);

        form.set_doctor_decision(Some(DoctorDecision::ComplexCase));

        assert!(form.input().requires_adl_file);
        assert!(form.adl_reasoning_required());
    }

    #[test]
    fn test_switching_back_to_simple_keeps_reasoning() {
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        form.set_doctor_decision(Some(DoctorDecision::ComplexCase));
        form.input_mut().adl_reasoning = Some("Treatment resistant".into());

        form.set_doctor_decision(Some(DoctorDecision::SimpleCase));

        assert_eq!(
            form.input().adl_reasoning.as_deref(),
            Some("Treatment resistant")
        );
        assert!(form.validate().is_ok());
    }

    #[tokio::test]
    async fn test_complex_case_without_reasoning_is_not_submitted() {
        let sink = CountingSink::new();
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        form.set_doctor_decision(Some(DoctorDecision::ComplexCase));
        form.input_mut().adl_reasoning = Some("   ".into());

        let err = submit_proforma(&form, &sink).await.unwrap_err();

        match err {
            WorkflowError::Validation(errors) => {
                assert!(errors.get("adl_reasoning").is_some());
                assert_eq!(errors.len(), 1);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert!(form.input().requires_adl_file);
    }

    #[tokio::test]
    async fn test_valid_edit_updates_existing_proforma() {
        let sink = CountingSink::new();
        let mut form = ProformaForm::from_existing(&existing_simple_case());
        form.toggle(ChecklistField::Speech, "Pressured");

        let saved = submit_proforma(&form, &sink).await.unwrap();

        assert_eq!(saved.proforma.id, 42);
        assert_eq!(saved.proforma.fields.speech.to_stored(), "Pressured");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_form_requires_patient() {
        let form = ProformaForm::new(0, date(2024, 1, 10), VisitType::FollowUp);
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("patient_id"), Some("Select a patient"));
    }
}
