// Kept in sync with the DDL in repository/context.rs.

diesel::table! {
    stored_records (destination, natural_key) {
        destination -> Text,
        natural_key -> Text,
        fact_type -> Text,
        subject -> Nullable<Text>,
        category -> Nullable<Text>,
        period -> Nullable<Text>,
        value_number -> Nullable<Double>,
        value_text -> Nullable<Text>,
        unit -> Text,
        target_id -> Text,
        priority -> Integer,
        source_url -> Text,
        document_name -> Nullable<Text>,
        provenance -> Text,
        extracted_at -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    target_health (target_id) {
        target_id -> Text,
        state -> Text,
        consecutive_failures -> Integer,
        last_run_at -> Nullable<Text>,
        last_success_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        last_error_at -> Nullable<Text>,
        run_started_at -> Nullable<Text>,
        disabled_reason -> Nullable<Text>,
        stats -> Text,
        host -> Nullable<Text>,
        version -> Nullable<Text>,
        updated_at -> Text,
    }
}
