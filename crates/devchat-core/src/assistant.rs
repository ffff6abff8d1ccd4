use crate::error::Result;
use crate::git::GitIdentity;
use crate::llm::{Chat, ResponseStream};
use crate::message::Message;
use crate::prompt::Prompt;
use crate::store::{parse_hashes, Store};
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Default number of history messages folded into a prompt.
pub const DEFAULT_MESSAGE_LIMIT: usize = 10;

/// State of one conversational turn: the prompt being built and how much
/// of the history budget it has used.
#[derive(Debug, Clone)]
pub struct Turn {
    prompt: Prompt,
    history_count: usize,
}

impl Turn {
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn history_count(&self) -> usize {
        self.history_count
    }

    pub fn into_prompt(self) -> Prompt {
        self.prompt
    }
}

pub struct Assistant {
    chat: Box<dyn Chat>,
    store: Arc<dyn Store>,
    user: GitIdentity,
    message_limit: usize,
}

impl Assistant {
    pub fn new(chat: Box<dyn Chat>, store: Arc<dyn Store>, user: GitIdentity) -> Self {
        Self {
            chat,
            store,
            user,
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    pub fn message_limit(&self) -> usize {
        self.message_limit
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Build the prompt for a new turn.
    ///
    /// Parent and reference hashes may be abbreviated; each must name a
    /// stored prompt or the turn is rejected before anything is sent.
    pub fn make_prompt(
        &self,
        request: &str,
        instruct_contents: &[String],
        context_contents: &[String],
        parent_hashes: &[String],
        reference_hashes: &[String],
    ) -> Result<Turn> {
        let mut prompt = self.chat.init_prompt(&self.user.name, &self.user.email);

        prompt.set_parents(self.resolve_existing(parent_hashes)?);
        prompt.set_references(self.resolve_existing(reference_hashes)?);

        if !instruct_contents.is_empty() {
            prompt.append_message(Message::instruct(instruct_contents.concat()))?;
        }
        prompt.set_request(request);
        for content in context_contents {
            prompt.append_message(Message::context(content.as_str()))?;
        }

        tracing::info!(
            parents = prompt.parents().len(),
            references = prompt.references().len(),
            context = context_contents.len(),
            "prompt created"
        );

        Ok(Turn {
            prompt,
            history_count: 0,
        })
    }

    fn resolve_existing(&self, inputs: &[String]) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        for prefix in parse_hashes(inputs)? {
            let hash = self.store.resolve_hash(&prefix)?;
            self.store.get_prompt(&hash)?;
            if !hashes.contains(&hash) {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    fn has_budget(&self, turn: &Turn) -> bool {
        turn.history_count < self.message_limit
    }

    /// Fold a stored prompt into the turn's history: its first response,
    /// then its request, then its context messages, one budget unit each.
    /// Returns how many units were folded.
    pub fn fold_history(&self, turn: &mut Turn, hash: &str) -> Result<usize> {
        let prior = self.store.get_prompt(hash)?;
        self.fold_prompt(turn, &prior)
    }

    fn fold_prompt(&self, turn: &mut Turn, prior: &Prompt) -> Result<usize> {
        let candidates = prior
            .responses()
            .get(&0)
            .into_iter()
            .chain(prior.request())
            .map(|m| (false, m))
            .chain(prior.context_messages().iter().map(|m| (true, m)));

        let mut records = Vec::new();
        let mut context = Vec::new();
        for (is_context, message) in candidates {
            if !self.has_budget(turn) {
                break;
            }
            if is_context {
                context.push(message.clone());
            } else {
                records.push(message.as_record());
            }
            turn.history_count += 1;
        }

        let folded = records.len() + context.len();
        // History is prepended, so context goes in back to front to keep its order.
        for message in records.into_iter().chain(context.into_iter().rev()) {
            turn.prompt.append_history(message)?;
        }

        tracing::debug!(
            folded,
            used = turn.history_count,
            limit = self.message_limit,
            "folded prompt into history"
        );
        Ok(folded)
    }

    /// Fold the turn's parents and references into its history, then keep
    /// walking each parent's own first parent until the budget runs out or
    /// the chain ends.
    pub fn fold_lineage(&self, turn: &mut Turn) -> Result<()> {
        let mut visited = HashSet::new();
        let mut frontier: VecDeque<(String, bool)> = turn
            .prompt
            .parents()
            .iter()
            .map(|h| (h.clone(), true))
            .chain(turn.prompt.references().iter().map(|h| (h.clone(), false)))
            .collect();

        while let Some((hash, follow)) = frontier.pop_front() {
            if !self.has_budget(turn) {
                tracing::debug!(limit = self.message_limit, "history budget exhausted");
                break;
            }
            if !visited.insert(hash.clone()) {
                continue;
            }

            let prior = self.store.get_prompt(&hash)?;
            self.fold_prompt(turn, &prior)?;
            if follow {
                if let Some(parent) = prior.parents().first() {
                    frontier.push_back((parent.clone(), true));
                }
            }
        }
        Ok(())
    }

    /// Send the turn and produce its output as it becomes available.
    pub fn iterate_response(&self, turn: Turn) -> ResponseIter<'_> {
        ResponseIter {
            chat: self.chat.as_ref(),
            store: self.store.as_ref(),
            prompt: turn.prompt,
            state: State::Pending,
        }
    }
}

enum State {
    Pending,
    Streaming(ResponseStream),
    Rendering(VecDeque<String>),
    Done,
}

/// Pull-based output of one turn.
///
/// With streaming enabled each call waits for one fragment from the chat
/// API and yields its text. Once the stream ends the prompt is stored, then
/// a `prompt <hash>` line is yielded, followed by a rendering of any
/// response variant beyond the first. Without streaming the first call
/// waits for the whole response, stores the prompt, and rendering of every
/// variant follows.
///
/// Dropping the iterator before it is exhausted leaves the prompt unstored.
/// After an error the iterator yields nothing more.
pub struct ResponseIter<'a> {
    chat: &'a dyn Chat,
    store: &'a dyn Store,
    prompt: Prompt,
    state: State,
}

impl<'a> ResponseIter<'a> {
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn into_prompt(self) -> Prompt {
        self.prompt
    }

    pub async fn next(&mut self) -> Option<Result<String>> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Pending => {
                    let started = if self.chat.config().stream {
                        self.chat
                            .stream_response(&self.prompt)
                            .await
                            .map(State::Streaming)
                    } else {
                        self.complete().await.map(State::Rendering)
                    };
                    match started {
                        Ok(state) => self.state = state,
                        Err(e) => return Some(Err(e)),
                    }
                }
                State::Streaming(mut stream) => match stream.next().await {
                    Some(Ok(blob)) => match self.prompt.append_response(&blob) {
                        Ok(delta) => {
                            self.state = State::Streaming(stream);
                            match delta {
                                Some(text) if !text.is_empty() => return Some(Ok(text)),
                                _ => {}
                            }
                        }
                        Err(e) => return Some(Err(e)),
                    },
                    Some(Err(e)) => return Some(Err(e)),
                    None => match self.finish_stream() {
                        Ok(lines) => self.state = State::Rendering(lines),
                        Err(e) => return Some(Err(e)),
                    },
                },
                State::Rendering(mut lines) => {
                    let line = lines.pop_front()?;
                    self.state = State::Rendering(lines);
                    return Some(Ok(line));
                }
                State::Done => return None,
            }
        }
    }

    async fn complete(&mut self) -> Result<VecDeque<String>> {
        let blob = self.chat.complete_response(&self.prompt).await?;
        self.prompt.set_response(&blob)?;
        self.store.store_prompt(&self.prompt)?;
        tracing::info!(hashes = ?self.prompt.hashes(), "stored prompt");

        self.prompt
            .responses()
            .keys()
            .map(|&index| Ok(self.prompt.formatted_response(index)? + "\n"))
            .collect()
    }

    fn finish_stream(&mut self) -> Result<VecDeque<String>> {
        self.store.store_prompt(&self.prompt)?;
        tracing::info!(hashes = ?self.prompt.hashes(), "stored prompt");

        let mut lines = VecDeque::new();
        lines.push_back(format!("\n\nprompt {}\n", self.prompt.hash(0)?));
        // Streaming normally fills only index 0; parallel variants are
        // rendered in full if a provider ever sends them.
        for index in 1..self.prompt.responses().len() {
            lines.push_back(self.prompt.formatted_response(index)? + "\n");
        }
        Ok(lines)
    }
}
