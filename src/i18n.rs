use crate::manager::AlertKind;
use serde::Deserialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const BUNDLED_EN_US: &str = include_str!("../assets/i18n/en_US.json");

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Language {
    ZhCn,
    EnUs,
}

impl Language {
    pub fn detect() -> Self {
        if let Some(locale_tag) = sys_locale::get_locale() {
            return Self::from_locale_tag(&locale_tag);
        }

        Self::EnUs
    }

    fn from_locale_tag(raw: &str) -> Self {
        let tag = raw.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Self::EnUs;
        }

        let is_chinese = tag.starts_with("zh")
            || tag == "cn"
            || tag.starts_with("cn_")
            || tag.starts_with("cn-")
            || tag.contains("_zh")
            || tag.contains("-zh");
        if is_chinese {
            return Self::ZhCn;
        }

        Self::EnUs
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::ZhCn => "zh_CN.json",
            Self::EnUs => "en_US.json",
        }
    }
}

macro_rules! locale_message_fields {
    ($macro:ident) => {
        $macro! {
            app_menu_name,
            note_menu_name,
            new_note_button,
            close_note_button,
            delete_note_button,
            quit_button,
            open_logs_button,
            enable_logging_button,
            disable_logging_button,
            note_input_placeholder,
            fetch_failed_title,
            create_failed_title,
            update_failed_title,
            delete_failed_title,
            alert_ok_button,
        }
    };
}

macro_rules! define_raw_locale_messages {
    ($($field:ident),+ $(,)?) => {
        #[derive(Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RawLocaleMessages {
            $(
                $field: String,
            )+
        }
    };
}

macro_rules! define_locale_messages {
    ($($field:ident),+ $(,)?) => {
        #[derive(Debug)]
        pub struct LocaleMessages {
            $(
                pub $field: &'static str,
            )+
        }
    };
}

macro_rules! impl_from_raw_locale_messages {
    ($($field:ident),+ $(,)?) => {
        impl From<RawLocaleMessages> for LocaleMessages {
            fn from(raw: RawLocaleMessages) -> Self {
                Self {
                    $(
                        $field: leak_str(raw.$field),
                    )+
                }
            }
        }
    };
}

locale_message_fields!(define_raw_locale_messages);
locale_message_fields!(define_locale_messages);
locale_message_fields!(impl_from_raw_locale_messages);

fn leak_str(value: String) -> &'static str {
    Box::leak(value.into_boxed_str())
}

static ZH_CN_MESSAGES: OnceLock<LocaleMessages> = OnceLock::new();
static EN_US_MESSAGES: OnceLock<LocaleMessages> = OnceLock::new();

#[derive(Clone, Copy, Debug)]
pub struct I18n {
    messages: &'static LocaleMessages,
}

impl I18n {
    pub fn new(lang: Language) -> Self {
        Self {
            messages: messages_for(lang),
        }
    }

    pub fn alert_title(self, kind: AlertKind) -> &'static str {
        match kind {
            AlertKind::FetchFailed => self.fetch_failed_title,
            AlertKind::CreateFailed => self.create_failed_title,
            AlertKind::UpdateFailed => self.update_failed_title,
            AlertKind::DeleteFailed => self.delete_failed_title,
        }
    }
}

impl Deref for I18n {
    type Target = LocaleMessages;

    fn deref(&self) -> &Self::Target {
        self.messages
    }
}

fn messages_for(lang: Language) -> &'static LocaleMessages {
    match lang {
        Language::ZhCn => ZH_CN_MESSAGES.get_or_init(|| load_messages(Language::ZhCn)),
        Language::EnUs => EN_US_MESSAGES.get_or_init(|| load_messages(Language::EnUs)),
    }
}

fn load_messages(lang: Language) -> LocaleMessages {
    match try_load_messages(lang) {
        Ok(messages) => messages,
        Err(err) => {
            crate::debug_log!(
                "[i18n] failed to load {}: {}; using bundled {}",
                lang.file_name(),
                err,
                Language::EnUs.file_name()
            );
            bundled_messages()
        }
    }
}

fn bundled_messages() -> LocaleMessages {
    match parse_messages(BUNDLED_EN_US) {
        Ok(messages) => messages,
        // The bundled file is checked by the test suite.
        Err(err) => unreachable!("bundled en_US.json is invalid: {err}"),
    }
}

fn parse_messages(raw: &str) -> Result<LocaleMessages, serde_json::Error> {
    serde_json::from_str::<RawLocaleMessages>(raw).map(LocaleMessages::from)
}

fn try_load_messages(lang: Language) -> Result<LocaleMessages, String> {
    let (path, raw) = load_locale_file(lang.file_name())?;
    crate::debug_log!(
        "[i18n] loading locale {} from {}",
        lang.file_name(),
        path.display()
    );

    parse_messages(&raw).map_err(|err| format!("{} parse failed: {}", path.display(), err))
}

fn load_locale_file(file_name: &str) -> Result<(PathBuf, String), String> {
    let candidates = collect_i18n_dirs();
    for dir in &candidates {
        let path = dir.join(file_name);
        if !path.is_file() {
            continue;
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|err| format!("{} read failed: {}", path.display(), err))?;
        return Ok((path, raw));
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(format!(
        "{} not found; searched directories: {}",
        file_name, searched
    ))
}

fn app_resources_i18n_dir(current_exe: &Path) -> Option<PathBuf> {
    let macos_dir = current_exe.parent()?;
    if macos_dir.file_name()?.to_string_lossy() != "MacOS" {
        return None;
    }
    let contents_dir = macos_dir.parent()?;
    if contents_dir.file_name()?.to_string_lossy() != "Contents" {
        return None;
    }

    Some(contents_dir.join("Resources").join("i18n"))
}

fn push_i18n_dir(candidates: &mut Vec<PathBuf>, candidate: PathBuf) {
    if candidate.as_os_str().is_empty() || candidates.contains(&candidate) {
        return;
    }
    candidates.push(candidate);
}

fn collect_i18n_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(resources_i18n_dir) = app_resources_i18n_dir(&current_exe) {
            push_i18n_dir(&mut candidates, resources_i18n_dir);
        }

        if let Some(exe_dir) = current_exe.parent() {
            for ancestor in exe_dir.ancestors().take(6) {
                push_i18n_dir(&mut candidates, ancestor.join("assets").join("i18n"));
            }
        }
    }

    if let Ok(current_dir) = std::env::current_dir() {
        push_i18n_dir(&mut candidates, current_dir.join("assets").join("i18n"));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_tags() {
        assert_eq!(Language::from_locale_tag("zh-Hans-CN"), Language::ZhCn);
        assert_eq!(Language::from_locale_tag("en_GB"), Language::EnUs);
        assert_eq!(Language::from_locale_tag(""), Language::EnUs);
    }

    #[test]
    fn bundled_and_shipped_locales_parse() {
        let en = bundled_messages();
        assert_eq!(en.new_note_button, "New Note");

        let zh = include_str!("../assets/i18n/zh_CN.json");
        assert!(parse_messages(zh).is_ok());
    }

    #[test]
    fn alert_titles_cover_every_kind() {
        let i18n = I18n::new(Language::EnUs);
        for kind in [
            AlertKind::FetchFailed,
            AlertKind::CreateFailed,
            AlertKind::UpdateFailed,
            AlertKind::DeleteFailed,
        ] {
            assert!(!i18n.alert_title(kind).is_empty());
        }
    }
}
