//! Defines a supplier service that deals material on a background thread and
//! streams each party's share to it over bounded channels
//!
//! The service deals a new item of a kind as soon as any party has taken
//! every share of that kind dealt so far. Shares a slower party has not taken
//! yet queue up on the dealing thread, so a draw waits only on the dealing
//! thread and never on another party

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    thread::{Builder, JoinHandle},
};

use crossbeam::channel::{bounded, Receiver, Select, Sender};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use spdz_mpc::{
    algebra::{Modulus, Scalar, ScalarShare},
    error::MpcError,
    network::PartyId,
    offline_prep::{InputMask, PreprocessingPhase, Triple, TruncationPair},
};
use tracing::log;

use crate::{dealer::TrustedDealer, error::DealerError};

/// The default capacity of each party's channel for each kind of material
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// The name of the dealing thread
const SERVICE_THREAD_NAME: &str = "spdz-supplier-service";

// ----------
// | Config |
// ----------

/// Configuration of the supplier service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplierServiceConfig {
    /// The number of items buffered per party for each kind of material
    pub channel_capacity: usize,
    /// The shifts truncation pairs are dealt for
    pub truncation_widths: Vec<u32>,
}

impl Default for SupplierServiceConfig {
    fn default() -> Self {
        Self { channel_capacity: DEFAULT_CHANNEL_CAPACITY, truncation_widths: Vec::new() }
    }
}

// ------------
// | Material |
// ------------

/// The kinds of material the service streams
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaterialKind {
    /// Arithmetic triples
    Triple,
    /// Boolean triples
    BitTriple,
    /// Shared random elements
    RandomElement,
    /// Shared random bits
    Bit,
    /// Input masks for values provided by the given party
    InputMask(PartyId),
    /// Truncation pairs for the given shift
    TruncationPair(u32),
}

/// One party's share of a dealt item
#[derive(Clone, Debug)]
enum Material {
    /// A share of a triple
    Triple(Triple),
    /// A share of an input mask
    InputMask(InputMask),
    /// A share of a random element or bit
    Share(ScalarShare),
    /// A share of a truncation pair
    TruncationPair(TruncationPair),
}

// -----------
// | Service |
// -----------

/// A handle to the dealing thread
pub struct SupplierService {
    /// Signals the dealing thread to exit
    shutdown: Sender<()>,
    /// The dealing thread
    handle: JoinHandle<()>,
}

impl SupplierService {
    /// Start dealing material for `n_parties` over `modulus`, returning the
    /// service and one supplier per party ordered by party id
    pub fn spawn(
        n_parties: usize,
        modulus: Arc<Modulus>,
        config: &SupplierServiceConfig,
    ) -> Result<(Self, Vec<ChannelSupplier>), DealerError> {
        let dealer = TrustedDealer::from_entropy(n_parties, modulus)?;
        Self::spawn_with_dealer(dealer, config)
    }

    /// Start dealing material with the given dealer
    pub fn spawn_with_dealer(
        dealer: TrustedDealer,
        config: &SupplierServiceConfig,
    ) -> Result<(Self, Vec<ChannelSupplier>), DealerError> {
        if config.channel_capacity == 0 {
            let msg = "channel capacity must be positive".to_string();
            return Err(DealerError::InvalidParameters(msg));
        }

        let n_parties = dealer.n_parties();
        let modulus = dealer.modulus().clone();

        let mut kinds = vec![MaterialKind::Triple, MaterialKind::RandomElement, MaterialKind::Bit];
        if modulus.supports_boolean() {
            kinds.push(MaterialKind::BitTriple);
        }
        kinds.extend((1..=n_parties as PartyId).map(MaterialKind::InputMask));
        let widths = config.truncation_widths.iter().copied().unique();
        kinds.extend(widths.map(MaterialKind::TruncationPair));

        // One channel per kind and party
        let mut senders = Vec::with_capacity(kinds.len());
        let mut receivers = vec![BTreeMap::new(); n_parties];
        for kind in kinds.iter() {
            let mut kind_senders = Vec::with_capacity(n_parties);
            for party_receivers in receivers.iter_mut() {
                let (tx, rx) = bounded(config.channel_capacity);
                kind_senders.push(tx);
                party_receivers.insert(*kind, rx);
            }
            senders.push(kind_senders);
        }

        let suppliers = receivers
            .into_iter()
            .zip(dealer.mac_key_shares())
            .enumerate()
            .map(|(idx, (channels, key_share))| ChannelSupplier {
                party_id: idx as PartyId + 1,
                modulus: modulus.clone(),
                mac_key_share: key_share.clone(),
                channels,
            })
            .collect_vec();

        // Deal the first item of every kind here so that invalid parameters
        // surface before the thread starts
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let mut worker = DealingWorker {
            dealer,
            backlog: vec![vec![VecDeque::new(); n_parties]; kinds.len()],
            kinds,
            senders,
            live: vec![true; n_parties],
            shutdown: shutdown_rx,
        };
        worker.refill()?;

        let handle = Builder::new()
            .name(SERVICE_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| DealerError::SpawnError(e.to_string()))?;

        log::debug!("started supplier service for {n_parties} parties over {modulus}");
        Ok((Self { shutdown: shutdown_tx, handle }, suppliers))
    }

    /// Stop dealing and wait for the dealing thread to exit
    ///
    /// Suppliers keep serving the material already buffered in their
    /// channels and report exhaustion afterwards
    pub fn shutdown(self) -> Result<(), DealerError> {
        // The worker may already have exited, in which case nobody listens
        let _ = self.shutdown.send(());
        self.handle.join().map_err(|_| DealerError::SpawnError("dealing thread panicked".into()))
    }
}

/// The state owned by the dealing thread
struct DealingWorker {
    /// The dealer producing the material
    dealer: TrustedDealer,
    /// The kinds of material dealt
    kinds: Vec<MaterialKind>,
    /// The channels to each party, indexed by kind then party
    senders: Vec<Vec<Sender<Material>>>,
    /// The shares dealt but not yet sent, indexed by kind then party
    backlog: Vec<Vec<VecDeque<Material>>>,
    /// Whether each party still holds its supplier
    live: Vec<bool>,
    /// Receives the shutdown signal
    shutdown: Receiver<()>,
}

impl DealingWorker {
    /// Deal a new item of every kind that some live party has no share of
    /// left to send
    fn refill(&mut self) -> Result<(), DealerError> {
        for (kind, queues) in self.kinds.iter().zip(self.backlog.iter_mut()) {
            let starved =
                queues.iter().zip(self.live.iter()).any(|(queue, live)| *live && queue.is_empty());
            if !starved {
                continue;
            }

            let dealt = deal(&mut self.dealer, *kind)?;
            for ((queue, item), live) in queues.iter_mut().zip(dealt).zip(self.live.iter()) {
                if *live {
                    queue.push_back(item);
                }
            }
        }

        Ok(())
    }

    /// The dealing loop, exits on shutdown or once every supplier is dropped
    fn run(mut self) {
        loop {
            if let Err(e) = self.refill() {
                log::error!("supplier service failed to deal: {e}");
                return;
            }

            let mut sel = Select::new();
            let mut targets = Vec::new();
            for (k, queues) in self.backlog.iter().enumerate() {
                for (p, queue) in queues.iter().enumerate() {
                    if !queue.is_empty() {
                        sel.send(&self.senders[k][p]);
                        targets.push((k, p));
                    }
                }
            }
            let shutdown_idx = sel.recv(&self.shutdown);

            let oper = sel.select();
            if oper.index() == shutdown_idx {
                let _ = oper.recv(&self.shutdown);
                log::debug!("supplier service shutting down");
                return;
            }

            let (k, p) = targets[oper.index()];
            let Some(item) = self.backlog[k][p].pop_front() else {
                unreachable!("selected a send without a pending item");
            };
            if oper.send(&self.senders[k][p], item).is_err() {
                // The party dropped its supplier, stop dealing to it
                log::debug!("party {} dropped its supplier", p + 1);
                self.live[p] = false;
                self.backlog.iter_mut().for_each(|queues| queues[p].clear());
                if !self.live.iter().any(|live| *live) {
                    return;
                }
            }
        }
    }
}

/// Deal one item of the given kind, returning each party's share
fn deal(dealer: &mut TrustedDealer, kind: MaterialKind) -> Result<Vec<Material>, DealerError> {
    Ok(match kind {
        MaterialKind::Triple => dealer.triple().into_iter().map(Material::Triple).collect(),
        MaterialKind::BitTriple => dealer.bit_triple()?.into_iter().map(Material::Triple).collect(),
        MaterialKind::RandomElement => {
            dealer.random_element().into_iter().map(Material::Share).collect()
        },
        MaterialKind::Bit => dealer.bit().into_iter().map(Material::Share).collect(),
        MaterialKind::InputMask(party) => {
            dealer.input_mask(party)?.into_iter().map(Material::InputMask).collect()
        },
        MaterialKind::TruncationPair(d) => {
            dealer.truncation_pair(d)?.into_iter().map(Material::TruncationPair).collect()
        },
    })
}

// ------------
// | Supplier |
// ------------

/// A supplier receiving one party's material from a [`SupplierService`]
///
/// Draws block until the dealing thread hands over the next item, which it
/// does regardless of how far the other parties have drawn
pub struct ChannelSupplier {
    /// The party the material belongs to
    party_id: PartyId,
    /// The modulus the material is shared over
    modulus: Arc<Modulus>,
    /// The party's share of the MAC key
    mac_key_share: Scalar,
    /// The channel for each kind of material
    channels: BTreeMap<MaterialKind, Receiver<Material>>,
}

impl ChannelSupplier {
    /// The party the material belongs to
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    /// Receive the next item of a kind
    fn recv(&self, kind: MaterialKind) -> Result<Material, MpcError> {
        self.channels
            .get(&kind)
            .ok_or_else(|| MpcError::SupplierExhausted(format!("{kind:?} is not dealt")))?
            .recv()
            .map_err(|_| MpcError::SupplierExhausted(format!("{kind:?} service stopped")))
    }

    /// Receive the next random element or bit
    fn recv_share(&self, kind: MaterialKind) -> Result<ScalarShare, MpcError> {
        match self.recv(kind)? {
            Material::Share(share) => Ok(share),
            other => Err(unexpected(kind, &other)),
        }
    }

    /// Receive the next triple of either domain
    fn recv_triple(&self, kind: MaterialKind) -> Result<Triple, MpcError> {
        match self.recv(kind)? {
            Material::Triple(triple) => Ok(triple),
            other => Err(unexpected(kind, &other)),
        }
    }
}

/// The error for material arriving on the wrong channel
fn unexpected(kind: MaterialKind, material: &Material) -> MpcError {
    MpcError::InvalidInput(format!("expected {kind:?}, received {material:?}"))
}

impl PreprocessingPhase for ChannelSupplier {
    fn modulus(&self) -> Arc<Modulus> {
        self.modulus.clone()
    }

    fn mac_key_share(&self) -> Scalar {
        self.mac_key_share.clone()
    }

    fn next_input_mask(&mut self, party: PartyId) -> Result<InputMask, MpcError> {
        let kind = MaterialKind::InputMask(party);
        match self.recv(kind)? {
            Material::InputMask(mask) => Ok(mask),
            other => Err(unexpected(kind, &other)),
        }
    }

    fn next_random_element(&mut self) -> Result<ScalarShare, MpcError> {
        self.recv_share(MaterialKind::RandomElement)
    }

    fn next_bit(&mut self) -> Result<ScalarShare, MpcError> {
        self.recv_share(MaterialKind::Bit)
    }

    fn next_truncation_pair(&mut self, d: u32) -> Result<TruncationPair, MpcError> {
        let kind = MaterialKind::TruncationPair(d);
        match self.recv(kind)? {
            Material::TruncationPair(pair) => Ok(pair),
            other => Err(unexpected(kind, &other)),
        }
    }

    fn next_triple(&mut self) -> Result<Triple, MpcError> {
        self.recv_triple(MaterialKind::Triple)
    }

    fn next_bit_triple(&mut self) -> Result<Triple, MpcError> {
        self.recv_triple(MaterialKind::BitTriple)
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use spdz_mpc::{
        algebra::{reconstruct, Scalar, ScalarShare},
        error::MpcError,
        numeric::{
            advanced::{inner_product, truncate},
            Logical, Numeric,
        },
        offline_prep::PreprocessingPhase,
        test_helpers::{execute_mock_mpc_with_suppliers, test_modulus, test_ring},
        PARTY1, PARTY2,
    };

    use super::{SupplierService, SupplierServiceConfig};
    use crate::dealer::TrustedDealer;

    /// Tests that every party receives shares of the same material
    #[test]
    fn test_streamed_material_consistent() {
        let ring = test_ring();
        let dealer = TrustedDealer::from_entropy(3, ring.clone()).unwrap();
        let key = dealer.mac_key().clone();
        let config = SupplierServiceConfig { channel_capacity: 4, truncation_widths: vec![8] };
        let (service, mut suppliers) = SupplierService::spawn_with_dealer(dealer, &config).unwrap();

        // Draw more items than a channel holds
        for _ in 0..10 {
            let triples = suppliers.iter_mut().map(|s| s.next_triple().unwrap()).collect_vec();
            let (a, a_mac) = reconstruct(&triples.iter().map(|t| t.left.clone()).collect_vec());
            let (b, _) = reconstruct(&triples.iter().map(|t| t.right.clone()).collect_vec());
            let (c, _) = reconstruct(&triples.iter().map(|t| t.product.clone()).collect_vec());
            assert_eq!(a_mac, &key * &a);
            assert_eq!(&a * &b, c);
        }

        let bits = suppliers.iter_mut().map(|s| s.next_bit_triple().unwrap()).collect_vec();
        let (a, _) = reconstruct(&bits.iter().map(|t| t.left.clone()).collect_vec());
        let (b, _) = reconstruct(&bits.iter().map(|t| t.right.clone()).collect_vec());
        let (c, _) = reconstruct(&bits.iter().map(|t| t.product.clone()).collect_vec());
        assert_eq!(c.bit_value(), a.bit_value() && b.bit_value());

        let pairs = suppliers.iter_mut().map(|s| s.next_truncation_pair(8).unwrap()).collect_vec();
        let (r_prime, _) = reconstruct(&pairs.iter().map(|p| p.r_prime.clone()).collect_vec());
        let (r, _) = reconstruct(&pairs.iter().map(|p| p.r.clone()).collect_vec());
        assert_eq!(r_prime.shr(8), r);

        let masks = suppliers.iter_mut().map(|s| s.next_input_mask(3).unwrap()).collect_vec();
        let (mask, _) = reconstruct(&masks.iter().map(|m| m.mask_share.clone()).collect_vec());
        assert_eq!(masks[2].open_value, Some(mask));

        let key_shares = suppliers.iter().map(|s| s.mac_key_share()).collect_vec();
        assert_eq!(key_shares.iter().fold(Scalar::zero(&ring), |acc, k| acc + k), key);

        service.shutdown().unwrap();
    }

    /// Tests that one party can draw far more than a channel holds while the
    /// other parties draw nothing, and that the others catch up afterwards
    #[test]
    fn test_party_runs_ahead() {
        let ring = test_ring();
        let dealer = TrustedDealer::from_entropy(3, ring).unwrap();
        let key = dealer.mac_key().clone();
        let config = SupplierServiceConfig { channel_capacity: 2, ..Default::default() };
        let (service, mut suppliers) = SupplierService::spawn_with_dealer(dealer, &config).unwrap();

        let n_draws = 20;
        let per_party = suppliers
            .iter_mut()
            .map(|s| (0..n_draws).map(|_| s.next_random_element().unwrap()).collect_vec())
            .collect_vec();

        for i in 0..n_draws {
            let shares = per_party.iter().map(|draws| draws[i].clone()).collect_vec();
            let (value, mac) = reconstruct(&shares);
            assert_eq!(mac, &key * &value);
        }

        service.shutdown().unwrap();
    }

    /// Tests that suppliers drain their buffers after shutdown and then
    /// report exhaustion
    #[test]
    fn test_exhaustion_after_shutdown() {
        let config = SupplierServiceConfig { channel_capacity: 2, ..Default::default() };
        let (service, mut suppliers) =
            SupplierService::spawn(2, test_modulus(), &config).unwrap();
        service.shutdown().unwrap();

        let supplier = &mut suppliers[0];
        let mut drawn = 0;
        let err = loop {
            match supplier.next_random_element() {
                Ok(_) => drawn += 1,
                Err(e) => break e,
            }
        };

        assert!(drawn <= config.channel_capacity);
        assert!(matches!(err, MpcError::SupplierExhausted(_)));

        // Kinds that are never dealt
        assert!(matches!(supplier.next_bit_triple(), Err(MpcError::SupplierExhausted(_))));
        assert!(matches!(supplier.next_truncation_pair(4), Err(MpcError::SupplierExhausted(_))));
    }

    /// Tests that the service rejects parameters it cannot deal for
    #[test]
    fn test_invalid_config() {
        let zero_capacity = SupplierServiceConfig { channel_capacity: 0, ..Default::default() };
        assert!(SupplierService::spawn(2, test_modulus(), &zero_capacity).is_err());

        let too_wide = SupplierServiceConfig { truncation_widths: vec![126], ..Default::default() };
        assert!(SupplierService::spawn(2, test_modulus(), &too_wide).is_err());
        assert!(SupplierService::spawn(1, test_modulus(), &Default::default()).is_err());
    }

    /// Tests a full computation over streamed material
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_mpc_over_streamed_material() {
        let ring = test_ring();
        let config = SupplierServiceConfig { channel_capacity: 16, truncation_widths: vec![2] };
        let (service, suppliers) = SupplierService::spawn(2, ring.clone(), &config).unwrap();

        let res = execute_mock_mpc_with_suppliers(suppliers, |_| {}, move |mut fabric| {
            let ring = ring.clone();
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let value =
                            |v: u64, owner| (me == owner).then(|| Scalar::from_u64(v, &ring));
                        let xs = [3, 4].map(|v| b.input(value(v, PARTY1), PARTY1));
                        let ys = [5, 6].map(|v| b.input(value(v, PARTY2), PARTY2));

                        // 3 * 5 + 4 * 6 = 39, shifted right by 2 is 9 or 10
                        let ip = inner_product(b, &xs, &ys);
                        let shifted = truncate(b, &ip, 2);
                        let bit = b.to_boolean(&ip);
                        (b.open(&shifted), b.open_bit(&bit))
                    })
                    .await
            }
        })
        .await;

        let candidates = [9, 10].map(|v| Scalar::from_u64(v, &test_ring()));
        for party_res in res {
            let (shifted, low_bit) = party_res.unwrap();
            assert!(candidates.contains(&shifted));
            assert!(low_bit);
        }

        service.shutdown().unwrap();
    }

    /// Tests a batch of multiplications needing more triples than a channel
    /// holds, with every party on a single threaded runtime
    #[tokio::test]
    async fn test_batch_larger_than_capacity() {
        let ring = test_ring();
        let config = SupplierServiceConfig { channel_capacity: 4, ..Default::default() };
        let (service, suppliers) = SupplierService::spawn(2, ring.clone(), &config).unwrap();

        let res = execute_mock_mpc_with_suppliers(suppliers, |_| {}, move |mut fabric| {
            let ring = ring.clone();
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let x = b.input((me == PARTY1).then(|| Scalar::from_u64(3, &ring)), PARTY1);
                        let y = b.input((me == PARTY2).then(|| Scalar::from_u64(5, &ring)), PARTY2);

                        let prods = b.par(move |b| (0..16).map(|_| b.mult(&x, &y)).collect_vec());
                        let total = b.gate(move |ctx| {
                            let zero = ScalarShare::zero(ctx.modulus);
                            Ok(prods.get().into_iter().fold(zero, |acc, p| acc + p))
                        });
                        b.open(&total)
                    })
                    .await
            }
        })
        .await;

        let expected = Scalar::from_u64(16 * 15, &test_ring());
        for party_res in res {
            assert_eq!(party_res.unwrap(), expected);
        }

        service.shutdown().unwrap();
    }
}
