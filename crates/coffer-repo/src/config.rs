use coffer_crypto::EncryptionKey;

/// Branch used when none is given.
pub const DEFAULT_BRANCH: &str = "main";

/// Reserved branch holding child repository records.
pub const METADATA_BRANCH: &str = ".metadata";

/// How one repository handle reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    /// Key that seals the serialized index.
    pub key: EncryptionKey,
    /// Branch this handle commits to.
    pub branch: String,
    /// Store file contents inside the index instead of as encrypted blobs.
    pub inlined: bool,
}

impl RepoConfig {
    /// Default branch, contents stored as encrypted blobs.
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            key,
            branch: DEFAULT_BRANCH.to_string(),
            inlined: false,
        }
    }

    /// The metadata branch, contents inlined.
    pub fn metadata(key: EncryptionKey) -> Self {
        Self {
            key,
            branch: METADATA_BRANCH.to_string(),
            inlined: true,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_inlined(mut self, inlined: bool) -> Self {
        self.inlined = inlined;
        self
    }
}
