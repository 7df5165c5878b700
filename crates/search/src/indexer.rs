use commitscope_core::Commit;
use tantivy::doc;
use tracing::info;

use crate::{CommitSearchIndex, SearchError};

impl CommitSearchIndex {
    /// Replace the whole index content with `commits` and commit. The reader
    /// is reloaded so results are visible as soon as this returns.
    pub fn rebuild(&self, commits: &[Commit]) -> Result<usize, SearchError> {
        let mut writer = self.lock_writer()?;
        writer.delete_all_documents()?;

        for commit in commits {
            let mut document = doc!(
                self.hash_field => commit.hash.as_str(),
                self.message_field => commit.message.as_str(),
                self.author_field => commit.author.as_str(),
                self.timestamp_field => commit.timestamp,
            );
            if let Some(summary) = &commit.summary {
                document.add_text(self.summary_field, summary);
            }
            if let Some(class) = commit.classification {
                document.add_text(self.classification_field, class.as_str());
            }
            for path in &commit.files_changed {
                document.add_text(self.files_field, path);
            }
            writer.add_document(document)?;
        }

        writer.commit()?;
        drop(writer);
        self.reader.reload()?;

        info!(docs = commits.len(), "search index rebuilt");
        Ok(commits.len())
    }
}
