//! Embedded schema bootstrap
//!
//! Each statement is idempotent; `DatabasePool::migrate` runs them in order
//! at startup. Tables are named after entities, plural snake_case, and JSON
//! blob columns are jsonb.

/// Statements applied at startup, in order.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT,
        phone TEXT,
        is_super_admin BOOLEAN NOT NULL DEFAULT FALSE,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        slug TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        permissions JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS memberships (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        company_id UUID NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        role_slug TEXT NOT NULL REFERENCES roles(slug),
        status TEXT NOT NULL DEFAULT 'active',
        extra_permissions JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, company_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        key_hash TEXT NOT NULL,
        key_prefix TEXT NOT NULL,
        expires_at TIMESTAMPTZ,
        last_used_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys (key_prefix)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        csrf_token TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ticket_statuses (
        tech_status TEXT PRIMARY KEY,
        tech_label TEXT NOT NULL,
        public_status TEXT NOT NULL,
        is_default BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id UUID PRIMARY KEY,
        subject TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'normal',
        category TEXT,
        module_slug TEXT,
        external_provider TEXT,
        external_reference TEXT,
        company_id UUID REFERENCES companies(id),
        requester_id UUID REFERENCES users(id),
        assigned_user_id UUID REFERENCES users(id),
        ai_summary TEXT,
        ai_summary_status TEXT,
        ai_summary_generated_at TIMESTAMPTZ,
        ai_tags JSONB NOT NULL DEFAULT '[]'::jsonb,
        ai_tags_generated_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        closed_at TIMESTAMPTZ,
        UNIQUE (external_provider, external_reference)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tickets_company ON tickets (company_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets (status)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ticket_replies (
        id UUID PRIMARY KEY,
        ticket_id UUID NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        author_id UUID REFERENCES users(id),
        body TEXT NOT NULL,
        is_internal BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_ticket_replies_ticket ON ticket_replies (ticket_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ticket_watchers (
        ticket_id UUID NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (ticket_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS automation_rules (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        cadence TEXT,
        cron_expression TEXT,
        scheduled_time TIMESTAMPTZ,
        run_once BOOLEAN NOT NULL DEFAULT FALSE,
        trigger_event TEXT,
        trigger_filters JSONB NOT NULL DEFAULT '{}'::jsonb,
        action_module TEXT NOT NULL,
        action_payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL DEFAULT 'active',
        next_run_at TIMESTAMPTZ,
        last_run_at TIMESTAMPTZ,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS automation_runs (
        id UUID PRIMARY KEY,
        rule_id UUID NOT NULL REFERENCES automation_rules(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ,
        duration_ms BIGINT,
        result_payload JSONB,
        error_message TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_automation_runs_rule ON automation_runs (rule_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notification_event_settings (
        event_type TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        description TEXT,
        message_template TEXT NOT NULL,
        user_visible BOOLEAN NOT NULL DEFAULT TRUE,
        broadcast BOOLEAN NOT NULL DEFAULT FALSE,
        allow_in_app BOOLEAN NOT NULL DEFAULT TRUE,
        allow_email BOOLEAN NOT NULL DEFAULT TRUE,
        allow_sms BOOLEAN NOT NULL DEFAULT FALSE,
        default_in_app BOOLEAN NOT NULL DEFAULT TRUE,
        default_email BOOLEAN NOT NULL DEFAULT FALSE,
        default_sms BOOLEAN NOT NULL DEFAULT FALSE,
        module_actions JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notification_preferences (
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL REFERENCES notification_event_settings(event_type) ON DELETE CASCADE,
        in_app BOOLEAN NOT NULL,
        email BOOLEAN NOT NULL,
        sms BOOLEAN NOT NULL,
        PRIMARY KEY (user_id, event_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        user_id UUID REFERENCES users(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        message TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        read_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log_entries (
        id UUID PRIMARY KEY,
        user_id UUID,
        action TEXT NOT NULL,
        entity_type TEXT,
        entity_id TEXT,
        previous_value JSONB,
        new_value JSONB,
        metadata JSONB,
        api_key_id UUID,
        ip_address TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log_entries (entity_type, entity_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_tracking_sends (
        id UUID PRIMARY KEY,
        company_id UUID REFERENCES companies(id),
        recipient TEXT NOT NULL,
        subject TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_tracking_events (
        id UUID PRIMARY KEY,
        send_id UUID NOT NULL REFERENCES email_tracking_sends(id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        url TEXT,
        ip_address TEXT,
        user_agent TEXT,
        referer TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS custom_field_definitions (
        id UUID PRIMARY KEY,
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        field_key TEXT NOT NULL,
        field_type TEXT NOT NULL,
        options JSONB NOT NULL DEFAULT '[]'::jsonb,
        required BOOLEAN NOT NULL DEFAULT FALSE,
        sort_order INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (entity_type, field_key)
    )
    "#,
];
