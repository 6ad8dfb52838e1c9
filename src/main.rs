pub mod config;
pub mod debounce;
pub mod i18n;
pub mod logger;
pub mod manager;
pub mod note;
pub mod record;
pub mod remote;
mod shell;
pub mod window_state;

use anyhow::{Context as _, Result};
use config::{AppConfig, Backend};
use gpui::*;
use gpui_component::{Theme, ThemeMode};
use remote::RemoteStore;
use remote::cloudkit::CloudKitStore;
use remote::local::LocalRecordStore;
use shell::NotesShell;
use std::path::PathBuf;
use std::sync::Arc;
use window_state::NoteFrameStore;

gpui::actions!(
    stickies,
    [
        NewNote,
        CloseNote,
        DeleteNote,
        Quit,
        EnableLoggingMenu,
        DisableLoggingMenu,
        OpenLogsMenu
    ]
);

pub(crate) fn configure_app_menus(cx: &mut App, i18n: i18n::I18n) {
    let mut app_items = Vec::new();
    if logger::file_logging_enabled() {
        app_items.extend([
            MenuItem::action(i18n.open_logs_button, OpenLogsMenu),
            MenuItem::separator(),
            MenuItem::action(i18n.disable_logging_button, DisableLoggingMenu),
        ]);
    } else {
        app_items.push(MenuItem::action(
            i18n.enable_logging_button,
            EnableLoggingMenu,
        ));
    }
    app_items.extend([
        MenuItem::separator(),
        MenuItem::action(i18n.quit_button, Quit),
    ]);

    cx.set_menus(vec![
        Menu {
            name: i18n.app_menu_name.into(),
            items: app_items,
        },
        Menu {
            name: i18n.note_menu_name.into(),
            items: vec![
                MenuItem::action(i18n.new_note_button, NewNote),
                MenuItem::action(i18n.close_note_button, CloseNote),
                MenuItem::separator(),
                MenuItem::action(i18n.delete_note_button, DeleteNote),
            ],
        },
    ]);
}

fn bind_note_keys(cx: &mut App) {
    cx.bind_keys([
        KeyBinding::new("cmd-n", NewNote, None),
        KeyBinding::new("cmd-w", CloseNote, None),
        KeyBinding::new("cmd-backspace", DeleteNote, None),
        // The text input claims cmd-backspace for itself otherwise.
        KeyBinding::new("cmd-backspace", DeleteNote, Some("Input")),
        KeyBinding::new("cmd-q", Quit, None),
    ]);
}

fn open_logs_directory() {
    let Some(log_file_path) = logger::log_file_path() else {
        crate::debug_log!("[log] cannot open logs directory: unresolved log path");
        return;
    };

    let log_dir = log_file_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or(log_file_path);
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        crate::debug_log!(
            "[log] failed to create logs directory: {} | {}",
            log_dir.display(),
            err
        );
        return;
    }

    match std::process::Command::new("open").arg(&log_dir).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            crate::debug_log!(
                "[log] open logs directory exited with {}: {}",
                status,
                log_dir.display()
            );
        }
        Err(err) => {
            crate::debug_log!(
                "[log] failed to open logs directory: {} | {}",
                log_dir.display(),
                err
            );
        }
    }
}

fn open_local_state(config: &AppConfig) -> Result<sled::Db> {
    let db_path = config.local_state_db_path();
    sled::open(&db_path)
        .with_context(|| format!("failed to open local state at {}", db_path.display()))
}

fn build_store(config: &AppConfig, db: Option<&sled::Db>) -> Result<Arc<dyn RemoteStore>> {
    if let Backend::CloudKit(cloudkit) = &config.backend {
        crate::debug_log!(
            "[config] using cloudkit container {} ({})",
            cloudkit.container,
            cloudkit.environment.as_str()
        );
        match CloudKitStore::new(cloudkit) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(err) => {
                crate::debug_log!("[store] cloudkit unavailable, using local records | {:#}", err);
            }
        }
    }

    let db = db.context("local record store needs the local state database")?;
    crate::debug_log!("[config] using local record store");
    Ok(Arc::new(LocalRecordStore::open(db)?))
}

fn main() {
    let (config, config_error) = match AppConfig::from_env() {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::fallback(), Some(err)),
    };
    logger::initialize(&config.data_dir);
    if let Some(err) = config_error {
        eprintln!("[config] {err:#}; using defaults with the local backend");
        crate::debug_log!("[config] invalid configuration, using defaults | {:#}", err);
    }

    let db = match open_local_state(&config) {
        Ok(db) => Some(db),
        Err(err) => {
            crate::debug_log!("[store] {:#}", err);
            None
        }
    };
    let frames = db.as_ref().and_then(|db| match NoteFrameStore::open(db) {
        Ok(frames) => Some(frames),
        Err(err) => {
            crate::debug_log!("[window] {:#}", err);
            None
        }
    });
    let store = match build_store(&config, db.as_ref()) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("[store] {err:#}");
            crate::debug_log!("[store] cannot start without a record store | {:#}", err);
            std::process::exit(1);
        }
    };

    let app = Application::new();
    let language = i18n::Language::detect();
    let i18n = i18n::I18n::new(language);
    let debounce_interval = config.debounce_interval;

    app.run(move |cx| {
        gpui_component::init(cx);
        Theme::change(ThemeMode::Light, None, cx);
        configure_app_menus(cx, i18n);
        bind_note_keys(cx);

        let shell = cx.new(|cx| NotesShell::new(store, frames, debounce_interval, i18n, cx));

        cx.on_action({
            let shell = shell.clone();
            move |_: &NewNote, cx| {
                shell.update(cx, |shell, cx| shell.new_note(cx));
            }
        });
        cx.on_action(|_: &Quit, cx| cx.quit());
        cx.on_action(move |_: &EnableLoggingMenu, cx| {
            if logger::enable_file_logging() {
                configure_app_menus(cx, i18n);
            }
        });
        cx.on_action(move |_: &DisableLoggingMenu, cx| {
            logger::disable_file_logging();
            configure_app_menus(cx, i18n);
        });
        cx.on_action(|_: &OpenLogsMenu, _| open_logs_directory());

        shell.update(cx, |shell, cx| shell.launch(cx));
        cx.activate(true);
    });
}
