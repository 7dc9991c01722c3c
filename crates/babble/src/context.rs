#![forbid(unsafe_code)]

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use memory::{Database, Dictionary, TransitionStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokenize::ids::fixed_id;
use tokenize::{language_for, Language, ParsedToken, TokenId};

use crate::assembly::{assemble, Utterance};
use crate::banned::BannedFilter;
use crate::config::ContextConfig;
use crate::learning;
use crate::scoring::score_all;
use crate::search::Searcher;
use crate::{EngineError, Result};

/// Everything guarded by the context lock.
struct ModelState {
    dictionary: Dictionary,
    banned: BannedFilter,
    store: TransitionStore,
}

/// One independently configured and locked model.
///
/// Speaking takes the lock shared; learning, banning and unbanning take it
/// exclusively. A request that panics is stopped here and reported as
/// [`EngineError::Fault`]; the model stays usable.
pub struct Context {
    id: String,
    config: ContextConfig,
    language: Arc<dyn Language>,
    boring: HashSet<String>,
    db: Arc<Database>,
    state: RwLock<ModelState>,
    rng: Mutex<ChaCha8Rng>,
    pool: ThreadPool,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Context {
    /// Open a context over `db`.
    ///
    /// `banned` holds the language's generic banned substrings and `boring`
    /// the words never used as keywords.
    pub fn open(id: &str, config: ContextConfig, db: Database, banned: &[String], boring: &[String]) -> Result<Self> {
        config.validate()?;
        let language =
            language_for(&config.language).ok_or_else(|| EngineError::UnknownLanguage(config.language.clone()))?;
        let db = Arc::new(db);
        let dictionary = Dictionary::load(Arc::clone(&db))?;
        let banned = BannedFilter::load(&db, &dictionary, banned)?;
        let store = TransitionStore::new(Arc::clone(&db));

        let thread_prefix = format!("babble-{}", id);
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.production.max_parallel_searches)
            .thread_name(move |i| format!("{}-{}", thread_prefix, i))
            .build()?;
        let rng = match config.production.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        log::info!(
            "context {} opened: language={}, orders={:?}, next id {}",
            id,
            language.name(),
            config.ngrams.enabled(),
            dictionary.next_id()
        );
        Ok(Self {
            id: id.to_string(),
            boring: boring.iter().map(|w| language.normalise(w.trim())).filter(|w| !w.is_empty()).collect(),
            config,
            language,
            db,
            state: RwLock::new(ModelState { dictionary, banned, store }),
            rng: Mutex::new(rng),
            pool,
        })
    }

    /// Context id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Active configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModelState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Per-request generator, seeded from the context's own.
    fn request_rng(&self) -> ChaCha8Rng {
        let mut shared = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        ChaCha8Rng::seed_from_u64(shared.gen())
    }

    fn guarded<T>(&self, op: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                log::error!("context {}: {} panicked: {}", self.id, op, message);
                Err(EngineError::Fault(message))
            }
        }
    }

    /// Reply to `input`, best first. Errors are returned.
    pub fn try_speak(&self, input: &str) -> Result<Vec<Utterance>> {
        self.guarded("speak", || {
            let (tokens, _) = self.language.parse(input, false, self.config.learning.max_token_length);
            let state = self.read();
            let keywords = self.keytoken_ids(&state, &tokens)?;
            log::debug!("context {}: {} keywords from {:?}", self.id, keywords.len(), input);
            self.produce(&state, &keywords)
        })
    }

    /// Reply to `input`, best first. Any failure is logged and yields no
    /// replies.
    pub fn speak(&self, input: &str) -> Vec<Utterance> {
        self.try_speak(input).unwrap_or_else(|e| {
            log::error!("context {}: unable to speak: {}", self.id, e);
            Vec::new()
        })
    }

    /// Reply around already-resolved keyword ids.
    pub fn speak_ids(&self, keywords: &[TokenId]) -> Result<Vec<Utterance>> {
        self.guarded("speak", || {
            let state = self.read();
            self.produce(&state, keywords)
        })
    }

    fn produce(&self, state: &ModelState, keywords: &[TokenId]) -> Result<Vec<Utterance>> {
        let mut rng = self.request_rng();
        let oldest = self.config.oldest_allowed(sampler::now());
        let searcher = Searcher::new(&state.store, &self.config, &state.banned, &self.pool, oldest);

        let found = searcher.keyword_search(keywords, &mut rng)?;
        let mut scored = score_all(&state.store, found, keywords, &self.config, oldest)?;
        if scored.is_empty() {
            let fallback = searcher.boundary_search(keywords, &mut rng)?;
            scored = score_all(&state.store, fallback, keywords, &self.config, oldest)?;
        }
        assemble(
            self.language.as_ref(),
            &state.dictionary,
            scored,
            self.config.production.base_representation_threshold,
        )
    }

    /// Learn from raw lines. Returns how many were learned; banned, short
    /// and unlearnable lines are skipped, failures are logged.
    pub fn learn<S: AsRef<str>>(&self, lines: &[S]) -> usize {
        let outcome = self.guarded("learn", || {
            let mut state = self.write();
            let mut learned = 0;
            for line in lines {
                let line = line.as_ref();
                if !state.banned.is_allowed(line) {
                    continue;
                }
                let (tokens, learnable) = self.language.parse(line, true, self.config.learning.max_token_length);
                if !learnable || tokens.is_empty() {
                    continue;
                }
                match self.learn_locked(&mut state, &tokens) {
                    Ok(true) => learned += 1,
                    Ok(false) => {}
                    Err(e) => log::error!("context {}: unable to learn {:?}: {}", self.id, line, e),
                }
            }
            Ok(learned)
        });
        let learned = outcome.unwrap_or(0);
        log::debug!("context {}: learned {} of {} lines", self.id, learned, lines.len());
        learned
    }

    /// Learn one already-parsed line.
    pub fn learn_tokens(&self, tokens: &[ParsedToken]) -> Result<bool> {
        self.guarded("learn", || {
            let mut state = self.write();
            self.learn_locked(&mut state, tokens)
        })
    }

    fn learn_locked(&self, state: &mut ModelState, tokens: &[ParsedToken]) -> Result<bool> {
        learning::learn(&mut state.dictionary, &mut state.banned, &state.store, &self.config, tokens)
    }

    /// Add context-specific bans. Repeats are harmless.
    pub fn ban(&self, tokens: &[String]) -> Result<()> {
        self.guarded("ban", || {
            let mut guard = self.write();
            let state = &mut *guard;
            state.banned.ban(&self.db, &state.dictionary, tokens)?;
            log::info!("context {}: banned {:?}", self.id, tokens);
            Ok(())
        })
    }

    /// Remove context-specific bans. Unknown tokens are ignored.
    pub fn unban(&self, tokens: &[String]) -> Result<()> {
        self.guarded("unban", || {
            let mut guard = self.write();
            let state = &mut *guard;
            state.banned.unban(&self.db, &state.dictionary, tokens)?;
            log::info!("context {}: unbanned {:?}", self.id, tokens);
            Ok(())
        })
    }

    /// Context-specific bans, sorted.
    pub fn banned_tokens(&self) -> Vec<String> {
        self.read().banned.context_bans().map(str::to_string).collect()
    }

    /// False if `text` contains a banned substring.
    pub fn is_allowed(&self, text: &str) -> bool {
        self.read().banned.is_allowed(text)
    }

    /// Keyword ids for parsed input: learned, not boring, not banned, in
    /// first-seen order.
    pub fn enumerate_keytoken_ids(&self, tokens: &[ParsedToken]) -> Result<Vec<TokenId>> {
        let state = self.read();
        self.keytoken_ids(&state, tokens)
    }

    fn keytoken_ids(&self, state: &ModelState, tokens: &[ParsedToken]) -> Result<Vec<TokenId>> {
        let mut bases: Vec<&str> = Vec::new();
        for token in tokens {
            let base = token.base.as_str();
            if fixed_id(base).is_some() || self.boring.contains(base) || bases.contains(&base) {
                continue;
            }
            bases.push(base);
        }
        let found = state.dictionary.resolve(&bases)?;
        Ok(bases
            .iter()
            .filter_map(|base| found.get(*base))
            .map(|entry| entry.id)
            .filter(|id| !state.banned.is_id_banned(*id))
            .collect())
    }
}
