use crate::ArchiveFormat;

/// Options for [`import_with_options`](crate::import_with_options).
#[derive(Clone, Debug)]
pub struct ImportOptions {
    /// File name or URL used to guess the format when sniffing fails.
    pub hint: Option<String>,
    /// Skip sniffing and decode as this format.
    pub format: Option<ArchiveFormat>,
    /// Remove a single top-level directory shared by every entry.
    pub strip_common_root: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            hint: None,
            format: None,
            strip_common_root: true,
        }
    }
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn strip_common_root(mut self, strip: bool) -> Self {
        self.strip_common_root = strip;
        self
    }
}
