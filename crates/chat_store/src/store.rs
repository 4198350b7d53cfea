use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chat_stream::ChatTurn;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatStoreError;
use crate::paths::{conversation_file_name, derive_title};
use crate::schema::{ConversationHeader, JsonLine, StoredTurn};

/// Directory-backed collection of conversation files.
#[derive(Debug, Clone)]
pub struct ChatStore {
    root: PathBuf,
}

/// Header-only view of a stored conversation, used for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub created_at: String,
    pub title: String,
    pub path: PathBuf,
}

/// One open conversation file with its parsed turns.
#[derive(Debug)]
pub struct StoredConversation {
    path: PathBuf,
    header: ConversationHeader,
    turns: Vec<ChatTurn>,
}

impl ChatStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new conversation file, titling it from the first user
    /// message.
    pub fn create(&self, first_user_message: &str) -> Result<StoredConversation, ChatStoreError> {
        fs::create_dir_all(&self.root)
            .map_err(|source| ChatStoreError::io("creating store root", &self.root, source))?;

        let conversation_id = Uuid::new_v4().to_string();
        let created_at = now_rfc3339()?;
        let title = derive_title(first_user_message);
        let header = ConversationHeader::v1(&conversation_id, &created_at, title);

        let path = self
            .root
            .join(conversation_file_name(&created_at, &conversation_id));
        let line = serde_json::to_string(&header)
            .map_err(|source| ChatStoreError::json_serialize(&path, source))?;
        let mut file = File::create(&path)
            .map_err(|source| ChatStoreError::io("creating conversation file", &path, source))?;
        writeln!(file, "{line}")
            .map_err(|source| ChatStoreError::io("writing conversation header", &path, source))?;

        Ok(StoredConversation {
            path,
            header,
            turns: Vec::new(),
        })
    }

    /// Opens a stored conversation by identifier.
    pub fn open(&self, conversation_id: &str) -> Result<StoredConversation, ChatStoreError> {
        let path = self.find(conversation_id)?;
        StoredConversation::open(&path)
    }

    /// Deletes a stored conversation by identifier.
    pub fn delete(&self, conversation_id: &str) -> Result<(), ChatStoreError> {
        let path = self.find(conversation_id)?;
        fs::remove_file(&path)
            .map_err(|source| ChatStoreError::io("deleting conversation file", &path, source))
    }

    /// Lists stored conversations, newest first.
    pub fn list(&self) -> Result<Vec<ConversationSummary>, ChatStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ChatStoreError::io("listing store root", &self.root, source));
            }
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| ChatStoreError::io("listing store root", &self.root, source))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let header = read_header(&path)?;
            summaries.push(ConversationSummary {
                conversation_id: header.conversation_id,
                created_at: header.created_at,
                title: header.title,
                path,
            });
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    fn find(&self, conversation_id: &str) -> Result<PathBuf, ChatStoreError> {
        let suffix = format!("_{conversation_id}.jsonl");
        let entries = fs::read_dir(&self.root)
            .map_err(|source| ChatStoreError::io("listing store root", &self.root, source))?;

        for entry in entries {
            let entry = entry
                .map_err(|source| ChatStoreError::io("listing store root", &self.root, source))?;
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&suffix));
            if matches {
                return Ok(path);
            }
        }

        Err(ChatStoreError::ConversationNotFound {
            root: self.root.clone(),
            conversation_id: conversation_id.to_string(),
        })
    }
}

impl StoredConversation {
    /// Opens and validates a conversation file.
    pub fn open(path: &Path) -> Result<Self, ChatStoreError> {
        let path = path.to_path_buf();
        let file = File::open(&path)
            .map_err(|source| ChatStoreError::io("opening conversation file", &path, source))?;
        let reader = BufReader::new(file);

        let mut header: Option<ConversationHeader> = None;
        let mut turns = Vec::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line = line_result
                .map_err(|source| ChatStoreError::io_line(&path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<JsonLine>(&line)
                .map_err(|source| ChatStoreError::json_line(&path, line_number, source))?;

            if line_number == 1 {
                match parsed {
                    JsonLine::Header(parsed_header) => {
                        if parsed_header.version != 1 {
                            return Err(ChatStoreError::UnsupportedVersion {
                                path,
                                line: line_number,
                                found: parsed_header.version,
                            });
                        }
                        header = Some(parsed_header);
                    }
                    JsonLine::Turn(_) => {
                        return Err(ChatStoreError::InvalidHeaderRecord {
                            path,
                            line: line_number,
                        });
                    }
                }
                continue;
            }

            match parsed {
                JsonLine::Header(_) => {
                    return Err(ChatStoreError::InvalidTurnRecord {
                        path,
                        line: line_number,
                    });
                }
                JsonLine::Turn(turn) => turns.push(turn.into_turn()),
            }
        }

        let header =
            header.ok_or_else(|| ChatStoreError::MissingHeader { path: path.clone() })?;

        Ok(Self {
            path,
            header,
            turns,
        })
    }

    /// Appends one completed turn to the conversation file.
    pub fn append_turn(&mut self, turn: &ChatTurn) -> Result<(), ChatStoreError> {
        let record = StoredTurn::from_turn(turn, now_rfc3339()?);
        let line = serde_json::to_string(&record)
            .map_err(|source| ChatStoreError::json_serialize(&self.path, source))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| {
                ChatStoreError::io("opening conversation file for append", &self.path, source)
            })?;
        writeln!(file, "{line}")
            .map_err(|source| ChatStoreError::io("appending turn record", &self.path, source))?;

        self.turns.push(record.into_turn());
        Ok(())
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.header.conversation_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.header.title
    }

    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[must_use]
    pub fn into_turns(self) -> Vec<ChatTurn> {
        self.turns
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_header(path: &Path) -> Result<ConversationHeader, ChatStoreError> {
    let file = File::open(path)
        .map_err(|source| ChatStoreError::io("opening conversation file", path, source))?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .map_err(|source| ChatStoreError::io_line(path, 1, source))?;

    if first_line.trim().is_empty() {
        return Err(ChatStoreError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    match serde_json::from_str::<JsonLine>(first_line.trim_end()) {
        Ok(JsonLine::Header(header)) => Ok(header),
        Ok(JsonLine::Turn(_)) => Err(ChatStoreError::InvalidHeaderRecord {
            path: path.to_path_buf(),
            line: 1,
        }),
        Err(source) => Err(ChatStoreError::json_line(path, 1, source)),
    }
}

fn now_rfc3339() -> Result<String, ChatStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(ChatStoreError::ClockFormat)
}
