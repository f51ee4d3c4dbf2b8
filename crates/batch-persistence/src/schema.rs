// Esquema Diesel (mantenido a mano, equivalente a `diesel print-schema`).

diesel::table! {
    batch_job_instance (id) {
        id -> Uuid,
        job_name -> Text,
        job_key -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    batch_job_execution (id) {
        id -> Uuid,
        seq -> Int8,
        instance_id -> Uuid,
        version -> Int4,
        status -> Text,
        exit_code -> Text,
        exit_description -> Text,
        parameters -> Jsonb,
        execution_context -> Jsonb,
        failures -> Jsonb,
        engine_version -> Text,
        created_at -> Timestamptz,
        start_time -> Nullable<Timestamptz>,
        end_time -> Nullable<Timestamptz>,
        last_updated -> Timestamptz,
    }
}

diesel::table! {
    batch_step_execution (id) {
        id -> Uuid,
        seq -> Int8,
        job_execution_id -> Uuid,
        step_name -> Text,
        version -> Int4,
        status -> Text,
        exit_code -> Text,
        exit_description -> Text,
        read_count -> Int8,
        write_count -> Int8,
        filter_count -> Int8,
        read_skip_count -> Int8,
        process_skip_count -> Int8,
        commit_count -> Int8,
        rollback_count -> Int8,
        start_time -> Nullable<Timestamptz>,
        end_time -> Nullable<Timestamptz>,
        last_updated -> Timestamptz,
        execution_context -> Jsonb,
        failures -> Jsonb,
    }
}

diesel::table! {
    batch_event_log (seq) {
        seq -> Int8,
        job_execution_id -> Uuid,
        ts -> Timestamptz,
        event_type -> Text,
        payload -> Jsonb,
    }
}

diesel::table! {
    people (person_id) {
        person_id -> Int8,
        first_name -> Text,
        last_name -> Text,
    }
}

diesel::joinable!(batch_job_execution -> batch_job_instance (instance_id));
diesel::joinable!(batch_step_execution -> batch_job_execution (job_execution_id));

diesel::allow_tables_to_appear_in_same_query!(batch_job_instance,
                                              batch_job_execution,
                                              batch_step_execution,
                                              batch_event_log,
                                              people,);
