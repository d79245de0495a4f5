use std::fs;

use dockconf_config::{
    ConfigEngine, ConfigError, ConfigModule, ConfigPaths, ConfigResult, ConfigValue, Deployment,
    EngineSettings, EntryState, Field, MissingReason, ModuleBuilder, ModuleCatalog, SECRET_MASK,
    SectionDecl, ServiceEntry,
};
use dockconf_fsops::Ownership;
use dockconf_test_support::fixtures::ProjectSandbox;
use serial_test::serial;

fn settings(sandbox: &ProjectSandbox, root_mode: bool) -> EngineSettings {
    let paths = ConfigPaths {
        env_file: sandbox.env_file(),
        secret_file: sandbox.secret_file(),
        secret_dir: sandbox.secret_dir(),
    };
    EngineSettings::new("stack", paths, sandbox.project_dir())
        .with_deployment(Deployment::Development)
        .with_root_mode(root_mode)
}

fn stack_module(owner: Ownership) -> ConfigResult<ConfigModule> {
    let uid = owner.uid.to_string();
    let gid = owner.gid.to_string();
    ModuleBuilder::new("stack")
        .section(
            SectionDecl::plain()
                .named("web")
                .field("B", Field::string().min_length(5))
                .field("X", Field::int().max_value(100))
                .field("DEBUG", Field::bool().with_default(false)),
        )
        .section(
            SectionDecl::secret()
                .named("database")
                .field("DB_PASSWORD", Field::string())
                .field("DB_PORT", Field::int().with_default(5432))
                .service(
                    "postgres",
                    [
                        ServiceEntry::new("DB_PASSWORD").owner(uid.clone()).group(gid.clone()),
                        ServiceEntry::new("DB_PORT")
                            .filename("port")
                            .owner(uid.clone())
                            .group(gid.clone())
                            .mode(0o440),
                    ],
                )
                .service(
                    "backup",
                    [ServiceEntry::new("DB_PASSWORD")
                        .filename("backup_password")
                        .owner(uid)
                        .group(gid)],
                ),
        )
        .build()
}

fn root_engine(sandbox: &ProjectSandbox) -> anyhow::Result<ConfigEngine> {
    let owner = Ownership::of(sandbox.project_dir())?;
    Ok(ConfigEngine::with_module(
        settings(sandbox, true),
        stack_module(owner)?,
    )?)
}

fn user_engine(sandbox: &ProjectSandbox) -> anyhow::Result<ConfigEngine> {
    let owner = Ownership::of(sandbox.project_dir())?;
    Ok(ConfigEngine::with_module(
        settings(sandbox, false),
        stack_module(owner)?,
    )?)
}

#[test]
fn root_mode_creates_missing_files_with_restricted_modes() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;

    let err = user_engine(&sandbox).expect_err("files are missing");
    let err = err.downcast::<ConfigError>()?;
    assert!(matches!(err, ConfigError::ImproperlyConfigured { .. }));
    assert!(!sandbox.env_file().exists());

    let engine = root_engine(&sandbox)?;
    assert!(engine.root_mode());
    assert_eq!(sandbox.mode(&sandbox.env_file())?, 0o644);
    assert_eq!(sandbox.mode(&sandbox.secret_file())?, 0o600);
    assert_eq!(sandbox.mode(&sandbox.secret_dir())?, 0o755);
    assert_eq!(sandbox.read(&sandbox.env_file())?, "");

    user_engine(&sandbox)?;
    Ok(())
}

#[test]
fn permissive_secret_file_is_rejected() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let sandbox = ProjectSandbox::new()?;
    root_engine(&sandbox)?;
    fs::set_permissions(sandbox.secret_file(), fs::Permissions::from_mode(0o644))?;

    let err = root_engine(&sandbox)
        .expect_err("secret file readable by others")
        .downcast::<ConfigError>()?;
    let message = err.to_string();
    assert!(message.contains(".secret.env"), "{message}");
    Ok(())
}

#[test]
fn values_persist_across_engine_instances() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    root_engine(&sandbox)?.set("B", &ConfigValue::from("asdfgh"), false)?;

    let engine = root_engine(&sandbox)?;
    assert_eq!(engine.get("B")?, ConfigValue::from("asdfgh"));
    let resolved = engine.get_root("B")?;
    assert!(!resolved.default_used);
    assert_eq!(sandbox.read(&sandbox.env_file())?, "B=asdfgh\n");

    let debug = engine.get_root("DEBUG")?;
    assert!(debug.default_used);
    assert_eq!(debug.value, ConfigValue::Bool(false));
    Ok(())
}

#[test]
fn out_of_bounds_values_leave_the_store_untouched() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;
    engine.set("X", &ConfigValue::Int(42), false)?;
    let before = sandbox.read(&sandbox.env_file())?;

    let err = engine
        .set("X", &ConfigValue::Int(150), false)
        .expect_err("above max_value");
    assert_eq!(err.to_string(), "X: Too large (150 > 100).");
    let err = engine.set_text("B", "abc", false).expect_err("too short");
    assert_eq!(err.to_string(), "B: Too short (3 < 5).");
    let err = engine
        .set("X", &ConfigValue::from("12"), false)
        .expect_err("wrong kind");
    assert_eq!(err.to_string(), "X: Must be integer.");

    assert_eq!(sandbox.read(&sandbox.env_file())?, before);
    Ok(())
}

#[test]
fn safe_writes_do_not_overwrite() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;
    engine.set_text("X", "7", true)?;
    let err = engine.set_text("X", "8", true).expect_err("already set");
    assert!(matches!(err, ConfigError::AlreadyExists { ref name } if name == "X"));
    assert_eq!(engine.get("X")?, ConfigValue::Int(7));
    engine.set_text("X", "8", false)?;
    assert_eq!(engine.get("X")?, ConfigValue::Int(8));
    Ok(())
}

#[test]
fn mutations_require_root_mode() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    root_engine(&sandbox)?;
    let engine = user_engine(&sandbox)?;

    assert!(matches!(
        engine.set("X", &ConfigValue::Int(1), false),
        Err(ConfigError::RootModeNeeded { operation: "set" })
    ));
    assert!(matches!(
        engine.delete("X"),
        Err(ConfigError::RootModeNeeded { .. })
    ));
    assert!(matches!(engine.list(), Err(ConfigError::RootModeNeeded { .. })));
    assert!(matches!(
        engine.provide_secrets("postgres"),
        Err(ConfigError::RootModeNeeded { .. })
    ));
    assert!(matches!(
        engine.generate("B", 12, false),
        Err(ConfigError::RootModeNeeded { .. })
    ));
    Ok(())
}

#[test]
fn missing_required_values_are_reported() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;

    let err = engine.get("B").expect_err("not set");
    assert!(matches!(
        err,
        ConfigError::ConfigMissing {
            reason: MissingReason::NotSet,
            ..
        }
    ));
    assert_eq!(err.to_string(), "B: Not set.");
    assert!(matches!(
        engine.get("NOPE"),
        Err(ConfigError::UnknownConfig { .. })
    ));

    let report = engine.list()?;
    assert_eq!(report.entry("B").map(|e| &e.state), Some(&EntryState::Absent));
    Ok(())
}

#[test]
fn delete_removes_values_and_ignores_missing_ones() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;
    sandbox.write(&sandbox.env_file(), "# managed\nX=5\n")?;

    assert!(engine.delete("X")?);
    assert_eq!(sandbox.read(&sandbox.env_file())?, "# managed\n");
    assert!(!engine.delete("X")?);
    assert_eq!(sandbox.read(&sandbox.env_file())?, "# managed\n");
    Ok(())
}

#[test]
fn listings_mask_secret_values() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;
    engine.set_text("DB_PASSWORD", "hunter2-hunter2", false)?;
    engine.set_text("B", "visible", false)?;
    sandbox.write(
        &sandbox.env_file(),
        &format!("{}X=lots\n", sandbox.read(&sandbox.env_file())?),
    )?;

    let report = engine.list()?;
    assert_eq!(
        report.entry("DB_PASSWORD").map(|e| &e.state),
        Some(&EntryState::Explicit {
            value: SECRET_MASK.to_string()
        })
    );
    assert_eq!(
        report.entry("DB_PORT").map(|e| &e.state),
        Some(&EntryState::Default {
            value: SECRET_MASK.to_string()
        })
    );
    assert_eq!(
        report.entry("X").map(|e| &e.state),
        Some(&EntryState::Invalid {
            message: "Must be integer.".to_string()
        })
    );

    let text = report.render(false);
    assert!(!text.contains("hunter2"));
    assert!(text.contains(" B     E ● visible"));
    let json = serde_json::to_string(&report)?;
    assert!(!json.contains("hunter2"));

    let stored = sandbox.read(&sandbox.secret_file())?;
    assert_eq!(stored, "DB_PASSWORD=aHVudGVyMi1odW50ZXIy\n");
    Ok(())
}

#[test]
fn provide_secrets_writes_only_the_consumers_files() -> anyhow::Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let sandbox = ProjectSandbox::new()?;
    let owner = Ownership::of(sandbox.project_dir())?;
    let engine = root_engine(&sandbox)?;
    engine.set_text("DB_PASSWORD", "s3cret", false)?;

    let secret_dir = sandbox.secret_dir();
    let backup = secret_dir.join("backup_password");
    fs::write(&backup, "stale")?;
    fs::set_permissions(&backup, fs::Permissions::from_mode(0o640))?;

    let provided = engine.provide_secrets("postgres")?;
    let names: Vec<_> = provided.iter().map(|secret| secret.field.as_str()).collect();
    assert_eq!(names, ["DB_PASSWORD", "DB_PORT"]);

    assert_eq!(fs::read_to_string(secret_dir.join("DB_PASSWORD"))?, "s3cret");
    assert_eq!(fs::read_to_string(secret_dir.join("port"))?, "5432");
    assert_eq!(sandbox.mode(&secret_dir.join("DB_PASSWORD"))?, 0o400);
    assert_eq!(sandbox.mode(&secret_dir.join("port"))?, 0o440);
    for (file, secret) in ["DB_PASSWORD", "port"].iter().zip(&provided) {
        let metadata = fs::metadata(secret_dir.join(file))?;
        assert_eq!((metadata.uid(), metadata.gid()), (owner.uid, owner.gid));
        assert_eq!((secret.uid, secret.gid), (owner.uid, owner.gid));
    }

    assert_eq!(fs::read_to_string(&backup)?, "stale");
    assert_eq!(sandbox.mode(&backup)?, 0o640);
    assert_eq!(fs::read_dir(&secret_dir)?.count(), 3);

    assert!(engine.provide_secrets("nobody")?.is_empty());
    Ok(())
}

#[test]
fn provide_secrets_fails_before_writing_when_a_value_is_missing() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;

    let err = engine.provide_secrets("postgres").expect_err("password unset");
    assert!(matches!(err, ConfigError::ConfigMissing { ref name, .. } if name == "DB_PASSWORD"));
    assert_eq!(fs::read_dir(sandbox.secret_dir())?.count(), 0);
    Ok(())
}

#[test]
fn user_mode_reads_provisioned_secrets() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let root = root_engine(&sandbox)?;
    root.set_text("DB_PASSWORD", "from-file", false)?;
    root.provide_secrets("postgres")?;

    let engine = user_engine(&sandbox)?;
    assert_eq!(engine.get("DB_PASSWORD")?, ConfigValue::from("from-file"));
    assert_eq!(engine.get("DB_PORT")?, ConfigValue::Int(5432));
    Ok(())
}

#[test]
#[serial]
fn user_mode_reads_plain_values_from_the_environment() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    root_engine(&sandbox)?;
    let engine = user_engine(&sandbox)?;

    temp_env::with_vars([("B", Some("abcdef")), ("X", Some("101"))], || {
        assert_eq!(engine.get("B").ok(), Some(ConfigValue::from("abcdef")));
        assert!(matches!(
            engine.get("X"),
            Err(ConfigError::ValueValidation { .. })
        ));
    });
    temp_env::with_var_unset("DEBUG", || {
        assert_eq!(engine.get("DEBUG").ok(), Some(ConfigValue::Bool(false)));
    });
    Ok(())
}

#[test]
fn generated_values_respect_length_and_kind() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let engine = root_engine(&sandbox)?;

    engine.generate("DB_PASSWORD", 32, false)?;
    let value = engine.get("DB_PASSWORD")?;
    let text = value.as_str().map(str::to_string).unwrap_or_default();
    assert_eq!(text.chars().count(), 32);
    assert!(text.chars().all(|c| c.is_ascii_graphic()));

    assert!(matches!(
        engine.generate("X", 4, false),
        Err(ConfigError::ValueValidation { .. })
    ));
    assert!(matches!(
        engine.generate("B", 3, false),
        Err(ConfigError::ValueValidation { .. })
    ));
    Ok(())
}

#[test]
fn production_requires_a_root_owned_project() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    if Ownership::of(sandbox.project_dir())?.uid == 0 {
        return Ok(());
    }
    let owner = Ownership::of(sandbox.project_dir())?;
    let err = ConfigEngine::with_module(
        settings(&sandbox, true).with_deployment(Deployment::Production),
        stack_module(owner)?,
    )
    .expect_err("project owned by a regular user");
    assert_eq!(
        err.to_string(),
        "improperly configured: In production the project directory must be owned by root."
    );
    Ok(())
}

#[test]
fn declaration_files_load_through_the_catalog() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let module = sandbox.write_declaration(
        "stack.yaml",
        "- name: web\n  kind: plain\n  fields:\n    - { name: PORT, type: int, default: 8000 }\n",
    )?;
    let mut settings = settings(&sandbox, true);
    settings.module = module.display().to_string();

    let engine = ConfigEngine::open(settings, &ModuleCatalog::new())?;
    assert_eq!(engine.get("PORT")?, ConfigValue::Int(8000));
    engine.set_text("PORT", "9000", false)?;
    assert_eq!(engine.get("PORT")?, ConfigValue::Int(9000));
    Ok(())
}

#[test]
fn duplicate_fields_across_sections_fail_construction() -> anyhow::Result<()> {
    let sandbox = ProjectSandbox::new()?;
    let module = ModuleBuilder::new("dup")
        .section(SectionDecl::plain().named("one").field("A", Field::int()))
        .section(SectionDecl::plain().named("two").field("A", Field::int()))
        .build()?;
    let err = ConfigEngine::with_module(settings(&sandbox, true), module).expect_err("duplicate");
    assert_eq!(
        err.to_string(),
        "improperly configured: Config field A is defined in one and two"
    );
    Ok(())
}
