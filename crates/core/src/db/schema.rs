//! SQL schema for the OPD records database.
//!
//! Foreign-key rules:
//! - deleting a patient removes its outpatient record, proformas, ADL files and movements;
//! - deleting a proforma removes its prescriptions and unlinks its ADL file;
//! - deleting a user nulls every reference to that user.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('Admin', 'MWO', 'JR', 'SR')),
    email TEXT NOT NULL UNIQUE,
    mobile TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    sex TEXT NOT NULL CHECK (sex IN ('M', 'F', 'Other')),
    age INTEGER,
    contact_number TEXT,
    cr_no TEXT UNIQUE,
    psy_no TEXT,
    assigned_room TEXT,
    assigned_doctor_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    has_adl_file INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_psy_no ON patients(psy_no);

CREATE TABLE IF NOT EXISTS outpatient_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL UNIQUE REFERENCES patients(id) ON DELETE CASCADE,
    marital_status TEXT,
    education TEXT,
    occupation TEXT,
    religion TEXT,
    family_type TEXT,
    locality TEXT,
    head_name TEXT,
    head_relationship TEXT,
    address TEXT,
    district TEXT,
    state TEXT,
    pin_code TEXT,
    monthly_income TEXT,
    filled_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clinical_proforma (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    filled_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    visit_date TEXT,
    visit_type TEXT NOT NULL DEFAULT 'first_visit'
        CHECK (visit_type IN ('first_visit', 'follow_up')),
    room_no TEXT,
    informant_present INTEGER NOT NULL DEFAULT 0,
    nature_of_information TEXT,
    onset_duration TEXT,
    course TEXT,
    precipitating_factor TEXT,
    illness_duration TEXT,
    current_episode_since TEXT,
    mood TEXT,
    behaviour TEXT,
    speech TEXT,
    thought TEXT,
    perception TEXT,
    somatic TEXT,
    bio_functions TEXT,
    adjustment TEXT,
    cognitive_function TEXT,
    fits TEXT,
    sexual_problem TEXT,
    substance_use TEXT,
    associated_medical_surgical TEXT,
    mse_behaviour TEXT,
    mse_affect TEXT,
    mse_thought TEXT,
    mse_perception TEXT,
    mse_cognitive_function TEXT,
    history_narrative TEXT,
    past_history TEXT,
    family_history TEXT,
    gpe TEXT,
    mse_insight TEXT,
    mse_judgement TEXT,
    diagnosis TEXT,
    icd_code TEXT,
    case_severity TEXT CHECK (case_severity IN ('mild', 'moderate', 'severe', 'critical')),
    doctor_decision TEXT CHECK (doctor_decision IN ('simple_case', 'complex_case')),
    requires_adl_file INTEGER NOT NULL DEFAULT 0,
    adl_reasoning TEXT,
    treatment_prescribed TEXT,
    disposal TEXT,
    referred_to TEXT,
    adl_file_id INTEGER REFERENCES adl_files(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clinical_proforma_patient ON clinical_proforma(patient_id);
CREATE INDEX IF NOT EXISTS idx_clinical_proforma_visit_date ON clinical_proforma(visit_date);

CREATE TABLE IF NOT EXISTS adl_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    adl_no TEXT NOT NULL UNIQUE,
    clinical_proforma_id INTEGER REFERENCES clinical_proforma(id) ON DELETE SET NULL,
    created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    file_status TEXT NOT NULL DEFAULT 'created'
        CHECK (file_status IN ('created', 'stored', 'retrieved', 'active', 'archived')),
    physical_file_location TEXT,
    file_created_date TEXT NOT NULL,
    last_accessed_date TEXT,
    last_accessed_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    total_visits INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    notes TEXT,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_adl_files_patient ON adl_files(patient_id);
CREATE INDEX IF NOT EXISTS idx_adl_files_status ON adl_files(file_status);

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clinical_proforma_id INTEGER NOT NULL REFERENCES clinical_proforma(id) ON DELETE CASCADE,
    medicine TEXT NOT NULL,
    dosage TEXT NOT NULL DEFAULT '',
    when_to_take TEXT NOT NULL DEFAULT '',
    frequency TEXT NOT NULL DEFAULT '',
    duration TEXT NOT NULL DEFAULT '',
    qty TEXT NOT NULL DEFAULT '',
    details TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_proforma ON prescriptions(clinical_proforma_id);

CREATE TABLE IF NOT EXISTS file_movements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    adl_file_id INTEGER NOT NULL REFERENCES adl_files(id) ON DELETE CASCADE,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    moved_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    movement_type TEXT NOT NULL
        CHECK (movement_type IN ('created', 'retrieved', 'returned', 'archived')),
    from_location TEXT,
    to_location TEXT,
    movement_date TEXT NOT NULL,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_file_movements_file ON file_movements(adl_file_id);

CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('create', 'update', 'delete')),
    changed_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    changed_at TEXT NOT NULL,
    summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_record ON audit_logs(table_name, record_id);

CREATE TABLE IF NOT EXISTS clinical_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_name TEXT NOT NULL,
    option_label TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (field_name, option_label)
);
"#;
