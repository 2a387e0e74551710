//! Node assembly: subsystem wiring, message dispatch, confirmation
//! handling, and the periodic housekeeping tasks.

use crate::active::ActiveTransactions;
use crate::alarm::Alarm;
use crate::block_arrival::BlockArrival;
use crate::block_processor::BlockProcessor;
use crate::config::NodeConfig;
use crate::gap_cache::GapCache;
use crate::observers::Observers;
use crate::vote_processor::VoteProcessor;
use crate::NodeError;
use chr_consensus::{OnlineReps, RepCrawler, Vote, VoteBlock};
use chr_crypto::{generate_keypair, keypair_from_private};
use chr_ledger::{Block, BlockKind, Genesis, Ledger};
use chr_messages::{
    ConfirmAck, ConfirmReq, Keepalive, Message, MessageHeader, MessageVisitor, NodeIdHandshake,
    Publish,
};
use chr_network::{PeerContainer, UdpNetwork};
use chr_store::{Store, WriteTransaction, META_NODE_ID};
use chr_types::{Account, Amount, BlockHash, KeyPair, NetworkParams, PrivateKey, PublicKey, Timestamp};
use chr_utils::{DetailType, Direction, StatType, Stats};
use rand::Rng;
use std::net::{SocketAddrV6, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a rep-crawl probe hash stays hot.
const REP_CRAWL_PROBE_TTL: Duration = Duration::from_secs(5);
/// Rep crawl cadence.
const REP_CRAWL_INTERVAL: Duration = Duration::from_secs(4);
/// Authoritative online-stake recomputation cadence.
const STAKE_RECALCULATION_INTERVAL: Duration = Duration::from_secs(300);
/// Bound on the dividend-chain sanity walk.
const DIVIDEND_CHAIN_MAX: usize = 1024;

pub struct Node {
    pub config: NodeConfig,
    pub params: NetworkParams,
    pub store: Arc<dyn Store>,
    pub ledger: Arc<Ledger>,
    pub genesis: Genesis,
    pub stats: Arc<Stats>,
    pub network: Arc<UdpNetwork>,
    pub peers: Mutex<PeerContainer>,
    pub block_arrival: BlockArrival,
    pub gap_cache: GapCache,
    pub online_reps: Mutex<OnlineReps>,
    pub rep_crawler: Mutex<RepCrawler>,
    pub active: ActiveTransactions,
    pub block_processor: Arc<BlockProcessor>,
    pub vote_processor: Arc<VoteProcessor>,
    pub alarm: Arc<Alarm>,
    pub observers: Observers,
    pub node_id: Arc<KeyPair>,
    voting_keys: Mutex<Vec<Arc<KeyPair>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Node {
    /// Assemble a node over `store`, initialising genesis and the node
    /// identity on first start. Must run on the I/O runtime.
    pub async fn new(config: NodeConfig, store: Arc<dyn Store>) -> Result<Arc<Self>, NodeError> {
        let mut params = NetworkParams::new(config.network);
        if let Some(minimum) = config.online_weight_minimum() {
            params.online_weight_minimum = minimum;
        }
        params.online_weight_quorum = config.online_weight_quorum;
        params.bootstrap_fraction_numerator = config.bootstrap_fraction_numerator;

        let stats = Arc::new(Stats::new());
        let genesis = Genesis::new();
        let ledger = Arc::new(Ledger::new(genesis.account, config.minimum_dividend()));

        let node_id = {
            let mut txn = store.tx_begin_write();
            if txn.account_count() == 0 {
                tracing::info!(genesis = %genesis.hash(), "initialising empty ledger");
                genesis.initialize(txn.as_mut());
            }
            match txn.meta_get(META_NODE_ID) {
                Some(bytes) => {
                    let secret: [u8; 32] =
                        bytes.try_into().map_err(|_| NodeError::CorruptIdentity)?;
                    keypair_from_private(PrivateKey(secret))
                }
                None => {
                    let keypair = generate_keypair();
                    txn.meta_put(META_NODE_ID, keypair.private.0.to_vec());
                    keypair
                }
            }
        };
        let node_id = Arc::new(node_id);
        tracing::info!(node_id = %chr_crypto::encode_account(&node_id.public), "node identity");

        let work_threshold = chr_work::work_threshold(config.network);
        let network = UdpNetwork::bind(
            config.peering_port,
            config.network,
            work_threshold,
            stats.clone(),
            node_id.clone(),
        )
        .await?;

        let mut peers = PeerContainer::new(
            network.local_endpoint(),
            config.network,
            params.max_peers_per_ip,
            params.max_legacy_peers_per_ip,
            params.max_legacy_peers,
        );
        peers.online_weight_minimum = params.online_weight_minimum;

        let online_reps = OnlineReps::new(params.cutoff.as_secs(), params.online_weight_minimum);
        let alarm = Alarm::new(tokio::runtime::Handle::current());

        let node = Arc::new(Self {
            block_processor: Arc::new(BlockProcessor::new(work_threshold)),
            vote_processor: Arc::new(VoteProcessor::new()),
            active: ActiveTransactions::new(),
            block_arrival: BlockArrival::new(),
            gap_cache: GapCache::new(),
            online_reps: Mutex::new(online_reps),
            rep_crawler: Mutex::new(RepCrawler::new()),
            observers: Observers::new(),
            peers: Mutex::new(peers),
            voting_keys: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            config,
            params,
            store,
            ledger,
            genesis,
            stats,
            network,
            alarm,
            node_id,
        });
        node.wire_observers();
        Ok(node)
    }

    /// Hook the internal observers: keepalive + rep probe for new peers,
    /// and the vote fanout into gap cache, online reps, and rep discovery.
    fn wire_observers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.observers.endpoint.add(move |endpoint| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            node.send_keepalive(*endpoint);
            node.rep_query(&[*endpoint]);
        });

        let weak = Arc::downgrade(self);
        self.observers.vote.add(move |(vote, endpoint)| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            Node::on_valid_vote(&node, vote, *endpoint);
        });

        // The container fires these while its own lock is held, so both
        // defer through the executor; handlers may take the peer lock.
        let mut peers = self.peers.lock().expect("peer lock poisoned");
        let weak = Arc::downgrade(self);
        peers.peer_observer = Box::new(move |endpoint| {
            if let Some(node) = weak.upgrade() {
                let inner = Arc::downgrade(&node);
                node.alarm.add(Instant::now(), move || {
                    if let Some(node) = inner.upgrade() {
                        node.observers.endpoint.notify(&endpoint);
                    }
                });
            }
        });
        let weak = Arc::downgrade(self);
        peers.disconnect_observer = Box::new(move || {
            if let Some(node) = weak.upgrade() {
                let inner = Arc::downgrade(&node);
                node.alarm.add(Instant::now(), move || {
                    if let Some(node) = inner.upgrade() {
                        node.observers.disconnect.notify(&());
                    }
                });
            }
        });
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.network.start(Box::new(move |message, header, sender| {
            if let Some(node) = weak.upgrade() {
                node.process_message(message, header, sender);
            }
        }));

        let mut threads = self.threads.lock().expect("thread registry poisoned");
        let node = self.clone();
        threads.push(
            std::thread::Builder::new()
                .name("block proc".into())
                .spawn(move || node.block_processor.run(&node))
                .expect("block processor thread spawn"),
        );
        let node = self.clone();
        threads.push(
            std::thread::Builder::new()
                .name("vote proc".into())
                .spawn(move || node.vote_processor.run(&node))
                .expect("vote processor thread spawn"),
        );
        let node = self.clone();
        threads.push(
            std::thread::Builder::new()
                .name("announce".into())
                .spawn(move || node.active.run(&node))
                .expect("announcement thread spawn"),
        );
        drop(threads);

        self.ongoing_keepalive();
        self.ongoing_syn_cookie_cleanup();
        self.ongoing_rep_crawl();
        self.ongoing_stake_recalculation();
        self.observers.started.notify(&());
        tracing::info!(endpoint = %self.network.local_endpoint(), network = self.config.network.as_str(), "node started");
    }

    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("node stopping");
        self.block_processor.stop();
        self.vote_processor.stop();
        self.active.stop();
        self.network.stop();
        self.alarm.stop();
        let mut threads = self.threads.lock().expect("thread registry poisoned");
        for thread in threads.drain(..) {
            let _ = thread.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Register a local representative key for vote generation.
    pub fn insert_voting_key(&self, keypair: KeyPair) {
        self.voting_keys
            .lock()
            .expect("voting key lock poisoned")
            .push(Arc::new(keypair));
    }

    // ── Ingress ─────────────────────────────────────────────────────────

    /// Route one parsed message through the visitor.
    pub fn process_message(&self, message: Message, header: MessageHeader, sender: SocketAddrV6) {
        let mut dispatch = NetworkDispatch {
            node: self,
            sender,
            version: header.version_using,
        };
        message.visit(&mut dispatch);
    }

    /// A block arrived from the wire (or was produced locally): remember
    /// the arrival and queue it for the ledger unless already heard.
    pub fn process_active(&self, block: Block) {
        if !self.block_arrival.add(block.hash()) {
            self.block_processor.add(block, Instant::now());
        }
    }

    /// Offer a block as an election candidate.
    fn publish_to_election(&self, block: &Block) {
        let online_stake = self
            .online_reps
            .lock()
            .expect("online reps lock poisoned")
            .online_stake();
        self.active.publish(block, online_stake);
    }

    /// An incoming fork: seed an election with the ledger's incumbent and
    /// ask the network to confirm it.
    pub(crate) fn process_fork(&self, txn: &mut dyn WriteTransaction, block: &Block) {
        let hash = block.hash();
        if txn.block_exists(&hash) || !self.ledger.root_exists(&*txn, block) {
            return;
        }
        let Some(incumbent) = self.ledger.forked_block(&*txn, block) else {
            return;
        };
        let started = !self.active.start_election(
            incumbent.clone(),
            Some(block.clone()),
            Box::new(|_| {}),
        );
        if started {
            tracing::info!(ours = %incumbent.hash(), theirs = %hash, root = %block.root(),
                "resolving fork");
            let fanout = self.peers.lock().expect("peer lock poisoned").list_fanout();
            self.network
                .broadcast_confirm_req(incumbent, fanout, Duration::ZERO);
        }
    }

    /// Dividend forks have no resolution policy; surface and drop.
    pub(crate) fn process_dividend_fork(&self, _txn: &mut dyn WriteTransaction, block: &Block) {
        tracing::warn!(block = %block.hash(), dividend = %block.dividend(),
            "dividend fork observed, dropping");
    }

    // ── Confirmation path ───────────────────────────────────────────────

    /// An election reached quorum on `winner`: make sure the ledger holds
    /// it, then fire the observer surface.
    pub fn process_confirmed(&self, winner: &Block) {
        let hash = winner.hash();
        let mut exists = {
            let txn = self.store.tx_begin_read();
            txn.block_exists(&hash)
        };
        if !exists {
            let mut txn = self.store.tx_begin_write();
            self.ledger.process(txn.as_mut(), winner);
            exists = txn.block_exists(&hash);
        }
        if !exists {
            tracing::debug!(block = %hash, "confirmed block cannot be applied yet");
            return;
        }

        let txn = self.store.tx_begin_read();
        if winner.kind() == BlockKind::Dividend {
            self.check_dividend_chain(txn.as_ref(), &hash);
        }
        let account = winner.account();
        let amount = self.ledger.amount(txn.as_ref(), &hash).unwrap_or(Amount::ZERO);
        let is_state_send = self.ledger.is_send(txn.as_ref(), winner);
        drop(txn);

        // Locally heard blocks already fired their observers at commit.
        if !self.block_arrival.recent(&hash) {
            self.notify_committed(winner, account, amount, is_state_send);
        }
    }

    /// Fire the block and balance observers for one committed block.
    pub(crate) fn notify_committed(
        &self,
        block: &Block,
        account: Account,
        amount: Amount,
        is_state_send: bool,
    ) {
        self.observers
            .blocks
            .notify(&(block.clone(), account, amount, is_state_send));
        if !amount.is_zero() {
            self.observers.account_balance.notify(&(account, false));
            if is_state_send {
                let destination = PublicKey(*block.link().as_bytes());
                self.observers.account_balance.notify(&(destination, true));
            }
        }
    }

    /// Walk the dividend chain from `hash` towards its origin, bounded.
    /// A cycle or over-long chain marks the history malformed; the walk
    /// stops rather than recursing without limit.
    fn check_dividend_chain(&self, txn: &dyn chr_store::Transaction, hash: &BlockHash) {
        let mut cursor = *hash;
        let mut depth = 0usize;
        while !cursor.is_zero() {
            if depth >= DIVIDEND_CHAIN_MAX {
                tracing::warn!(head = %hash, "dividend chain exceeds depth bound, stopping walk");
                return;
            }
            let Some(block) = self.ledger.block_get(txn, &cursor) else {
                tracing::warn!(missing = %cursor, "dividend chain is broken");
                return;
            };
            cursor = block.dividend();
            depth += 1;
        }
        tracing::debug!(head = %hash, epochs = depth, "dividend chain verified");
    }

    // ── Votes ───────────────────────────────────────────────────────────

    /// Fanout for every valid, non-replay vote: orphan accounting, online
    /// stake, and representative discovery.
    fn on_valid_vote(self: &Arc<Self>, vote: &Vote, endpoint: SocketAddrV6) {
        let txn = self.store.tx_begin_read();
        let weight_of = |account: &Account| self.ledger.weight(txn.as_ref(), account);
        let now = Timestamp::now();

        let online_stake = {
            let mut online = self.online_reps.lock().expect("online reps lock poisoned");
            online.observe(vote.account, &weight_of, now);
            online.online_stake()
        };

        // Orphans gathering enough voter stake schedule a bootstrap check.
        let threshold = Amount::raw(
            (online_stake.number() / 256)
                .saturating_mul(self.params.bootstrap_fraction_numerator as u128),
        );
        let crossed = self
            .gap_cache
            .vote(vote.account, &vote.hashes(), &weight_of, threshold);
        for missing in crossed {
            self.schedule_bootstrap_check(missing);
        }

        // A vote answering one of our probes marks the sender as a
        // probable representative.
        let rep_weight = weight_of(&vote.account);
        if rep_weight.number() > online_stake.number() / 1000 {
            let probed = {
                let crawler = self.rep_crawler.lock().expect("rep crawler lock poisoned");
                vote.hashes().iter().any(|hash| crawler.exists(hash))
            };
            if probed {
                let updated = self.peers.lock().expect("peer lock poisoned").rep_response(
                    &endpoint,
                    vote.account,
                    rep_weight,
                    now,
                );
                if updated {
                    tracing::info!(%endpoint, account = %chr_crypto::encode_account(&vote.account),
                        "found a representative");
                    for winner in self.active.list_winners() {
                        self.network.send_confirm_req(endpoint, winner);
                    }
                }
            }
        }
    }

    fn schedule_bootstrap_check(self: &Arc<Self>, hash: BlockHash) {
        let weak = Arc::downgrade(self);
        let delay = self.params.gap_cache_bootstrap_delay;
        self.alarm.add(Instant::now() + delay, move || {
            let Some(node) = weak.upgrade() else {
                return;
            };
            let txn = node.store.tx_begin_read();
            if !txn.block_exists(&hash) {
                tracing::info!(block = %hash, "missing block with voter quorum, initiating bootstrap");
                node.stats.inc_detail_only(StatType::Ledger, DetailType::Gap);
            }
        });
    }

    /// Build one vote per local representative over `hashes`, advancing
    /// and persisting each representative's sequence number.
    fn make_votes(&self, hashes: &[BlockHash]) -> Vec<Vote> {
        if hashes.is_empty() {
            return Vec::new();
        }
        let keys: Vec<Arc<KeyPair>> = self
            .voting_keys
            .lock()
            .expect("voting key lock poisoned")
            .clone();
        if keys.is_empty() {
            return Vec::new();
        }
        let bundle: Vec<VoteBlock> = hashes.iter().copied().map(VoteBlock::Hash).collect();
        let mut votes = Vec::with_capacity(keys.len());
        let mut txn = self.store.tx_begin_write();
        for key in keys {
            let sequence = txn
                .vote_get(&key.public)
                .and_then(|bytes| Vote::from_store_bytes(&bytes))
                .map(|stored| stored.sequence + 1)
                .unwrap_or(1);
            let vote = Vote::new(key.public, &key.private, sequence, bundle.clone());
            txn.vote_put(&key.public, vote.to_store_bytes());
            votes.push(vote);
        }
        votes
    }

    /// Self-vote: feed local representatives' votes through the normal
    /// vote path so they tally and rebroadcast like anyone else's.
    pub fn generate_votes(&self, hashes: &[BlockHash]) {
        for vote in self.make_votes(hashes) {
            self.vote_processor
                .vote(vote, self.network.local_endpoint());
        }
    }

    /// Answer a confirm_req directly with our representatives' votes.
    fn send_confirm_ack(&self, hashes: &[BlockHash], endpoint: SocketAddrV6) {
        for vote in self.make_votes(hashes) {
            self.network.confirm_send(vote, endpoint);
        }
    }

    // ── Housekeeping ────────────────────────────────────────────────────

    fn ongoing_keepalive(self: &Arc<Self>) {
        self.keepalive_preconfigured();
        let now = Timestamp::now();
        let cutoff = now.saturating_sub(self.params.cutoff.as_secs());
        let evicted = self
            .peers
            .lock()
            .expect("peer lock poisoned")
            .purge_list(cutoff, now);
        for peer in evicted {
            if peer.last_attempt.elapsed_since(now) > self.params.period.as_secs() {
                self.send_keepalive(peer.endpoint);
            }
        }
        self.gap_cache.purge_old();

        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + self.params.period, move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_keepalive();
                }
            });
    }

    fn ongoing_syn_cookie_cleanup(self: &Arc<Self>) {
        let cutoff = Timestamp::now().saturating_sub(self.params.syn_cookie_cutoff.as_secs());
        self.peers
            .lock()
            .expect("peer lock poisoned")
            .purge_syn_cookies(cutoff);
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + self.params.syn_cookie_cutoff * 2, move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_syn_cookie_cleanup();
                }
            });
    }

    fn ongoing_rep_crawl(self: &Arc<Self>) {
        let endpoints = self.peers.lock().expect("peer lock poisoned").rep_crawl();
        self.rep_query(&endpoints);
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + REP_CRAWL_INTERVAL, move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_rep_crawl();
                }
            });
    }

    fn ongoing_stake_recalculation(self: &Arc<Self>) {
        {
            let txn = self.store.tx_begin_read();
            let weight_of = |account: &Account| self.ledger.weight(txn.as_ref(), account);
            self.online_reps
                .lock()
                .expect("online reps lock poisoned")
                .recalculate(&weight_of);
        }
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + STAKE_RECALCULATION_INTERVAL, move || {
                if let Some(node) = weak.upgrade() {
                    node.ongoing_stake_recalculation();
                }
            });
    }

    /// Probe `endpoints` with a confirm_req for an arbitrary block; a vote
    /// that answers it identifies the sender as a representative.
    fn rep_query(self: &Arc<Self>, endpoints: &[SocketAddrV6]) {
        if endpoints.is_empty() {
            return;
        }
        let block = {
            let txn = self.store.tx_begin_read();
            let index = rand::thread_rng().gen::<u64>();
            txn.nth_block_hash(index)
                .and_then(|hash| self.ledger.block_get(txn.as_ref(), &hash))
        };
        let Some(block) = block else {
            return;
        };
        let hash = block.hash();
        self.rep_crawler
            .lock()
            .expect("rep crawler lock poisoned")
            .add(hash);
        let now = Timestamp::now();
        {
            let mut peers = self.peers.lock().expect("peer lock poisoned");
            for endpoint in endpoints {
                peers.rep_request(endpoint, now);
            }
        }
        for endpoint in endpoints {
            self.network.send_confirm_req(*endpoint, block.clone());
        }
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + REP_CRAWL_PROBE_TTL, move || {
                if let Some(node) = weak.upgrade() {
                    node.rep_crawler
                        .lock()
                        .expect("rep crawler lock poisoned")
                        .remove(&hash);
                }
            });
    }

    fn keepalive_preconfigured(&self) {
        for peer in &self.config.preconfigured_peers {
            match peer.to_socket_addrs() {
                Ok(addresses) => {
                    for address in addresses {
                        let endpoint = chr_network::map_endpoint_to_v6(&address);
                        self.send_keepalive(endpoint);
                    }
                }
                Err(error) => {
                    tracing::warn!(peer, %error, "could not resolve preconfigured peer");
                }
            }
        }
    }

    pub fn send_keepalive(&self, endpoint: SocketAddrV6) {
        let mut peer_slots = [SocketAddrV6::new(std::net::Ipv6Addr::UNSPECIFIED, 0, 0, 0); 8];
        self.peers
            .lock()
            .expect("peer lock poisoned")
            .random_fill(&mut peer_slots);
        self.network.send_keepalive(endpoint, peer_slots);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn latest(&self, account: &Account) -> BlockHash {
        let txn = self.store.tx_begin_read();
        self.ledger.latest(txn.as_ref(), account)
    }

    pub fn balance(&self, account: &Account) -> Amount {
        let txn = self.store.tx_begin_read();
        self.ledger.account_balance(txn.as_ref(), account)
    }

    pub fn balance_pending(&self, account: &Account) -> (Amount, Amount) {
        let txn = self.store.tx_begin_read();
        (
            self.ledger.account_balance(txn.as_ref(), account),
            self.ledger.account_pending(txn.as_ref(), account),
        )
    }

    pub fn weight(&self, account: &Account) -> Amount {
        let txn = self.store.tx_begin_read();
        self.ledger.weight(txn.as_ref(), account)
    }

    pub fn representative(&self, account: &Account) -> Option<Account> {
        let txn = self.store.tx_begin_read();
        txn.account_get(account).map(|info| info.representative)
    }

    pub fn block(&self, hash: &BlockHash) -> Option<Block> {
        let txn = self.store.tx_begin_read();
        self.ledger.block_get(txn.as_ref(), hash)
    }

    /// The margin the leading candidate must hold: `online_stake ×
    /// quorum / 100`.
    pub fn delta(&self) -> Amount {
        let online_stake = self
            .online_reps
            .lock()
            .expect("online reps lock poisoned")
            .online_stake();
        self.delta_of(online_stake)
    }

    pub(crate) fn delta_of(&self, online_stake: Amount) -> Amount {
        Amount::raw(
            (online_stake.number() / 100)
                .saturating_mul(self.params.online_weight_quorum as u128),
        )
    }
}

/// Per-datagram dispatch: one visitor per sender.
struct NetworkDispatch<'a> {
    node: &'a Node,
    sender: SocketAddrV6,
    version: u8,
}

impl NetworkDispatch<'_> {
    fn contacted(&self) {
        let now = Timestamp::now();
        let should_handshake = self
            .node
            .peers
            .lock()
            .expect("peer lock poisoned")
            .contacted(&self.sender, self.version, now);
        if should_handshake {
            let cookie = self
                .node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .assign_syn_cookie(&self.sender, now);
            if let Some(cookie) = cookie {
                self.node
                    .network
                    .send_node_id_handshake(self.sender, Some(cookie), None);
            }
        }
    }
}

impl MessageVisitor for NetworkDispatch<'_> {
    fn keepalive(&mut self, message: &Keepalive) {
        tracing::trace!(sender = %self.sender, "keepalive received");
        self.node
            .stats
            .inc(StatType::Message, DetailType::Keepalive, Direction::In);
        self.contacted();
        // Merge the advertised peers: reach out to everyone new.
        let now = Timestamp::now();
        for endpoint in &message.peers {
            if endpoint.ip().is_unspecified() {
                continue;
            }
            let skip = self
                .node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .reachout(endpoint, now);
            if !skip {
                self.node.send_keepalive(*endpoint);
            }
        }
    }

    fn publish(&mut self, message: &Publish) {
        tracing::trace!(sender = %self.sender, block = %message.block.hash(), "publish received");
        self.node
            .stats
            .inc(StatType::Message, DetailType::Publish, Direction::In);
        self.contacted();
        self.node.process_active(message.block.clone());
        self.node.publish_to_election(&message.block);
    }

    fn confirm_req(&mut self, message: &ConfirmReq) {
        tracing::trace!(sender = %self.sender, block = %message.block.hash(),
            "confirm_req received");
        self.node
            .stats
            .inc(StatType::Message, DetailType::ConfirmReq, Direction::In);
        self.contacted();
        self.node.process_active(message.block.clone());
        self.node.publish_to_election(&message.block);

        // Answer with our committed successor for the root, if we vote.
        if self.node.config.enable_voting {
            let successor = {
                let txn = self.node.store.tx_begin_read();
                self.node.ledger.successor(txn.as_ref(), &message.block.root())
            };
            if let Some(successor) = successor {
                self.node.send_confirm_ack(&[successor.hash()], self.sender);
            }
        }
    }

    fn confirm_ack(&mut self, message: &ConfirmAck) {
        tracing::trace!(sender = %self.sender, sequence = message.vote.sequence,
            "confirm_ack received");
        self.node
            .stats
            .inc(StatType::Message, DetailType::ConfirmAck, Direction::In);
        self.contacted();
        for entry in &message.vote.blocks {
            if let VoteBlock::Block(block) = entry {
                self.node.process_active(block.clone());
                self.node.publish_to_election(block);
            }
        }
        self.node
            .vote_processor
            .vote(message.vote.clone(), self.sender);
    }

    fn node_id_handshake(&mut self, message: &NodeIdHandshake) {
        tracing::trace!(sender = %self.sender, query = message.query.is_some(),
            response = message.response.is_some(), "node_id_handshake received");
        self.node
            .stats
            .inc(StatType::Message, DetailType::NodeIdHandshake, Direction::In);
        let now = Timestamp::now();
        let out_respond_to = message.query;
        let mut validated_response = false;

        if let Some((account, signature)) = &message.response {
            let invalid = self
                .node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .validate_syn_cookie(&self.sender, account, signature);
            if !invalid {
                validated_response = true;
                if *account != self.node.node_id.public {
                    let mut peers = self.node.peers.lock().expect("peer lock poisoned");
                    peers.insert(&self.sender, self.version, now);
                    peers.set_node_id(&self.sender, *account);
                }
            } else {
                tracing::debug!(sender = %self.sender,
                    account = %chr_crypto::encode_account(account),
                    "syn cookie signature failed to validate");
            }
        }

        let out_query = if !validated_response
            && !self
                .node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .known_peer(&self.sender)
        {
            self.node
                .peers
                .lock()
                .expect("peer lock poisoned")
                .assign_syn_cookie(&self.sender, now)
        } else {
            None
        };

        if out_query.is_some() || out_respond_to.is_some() {
            self.node
                .network
                .send_node_id_handshake(self.sender, out_query, out_respond_to);
        }
    }
}
