use async_stream::stream;
use futures::future::join_all;
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stablecast_sdk::{
    ChannelDeliver, GroupConfigBuilder, GroupEvent, MemoryNetwork, MemoryTransport, Result,
    SdkError, StableMulticast,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Statistics collected during a simulated group run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub num_members: usize,
    pub num_messages: usize,
    pub total_deliveries: usize,
    pub total_evicted: usize,
    pub still_buffered: usize,
    pub join_time: Duration,
    pub total_time: Duration,
    pub avg_send_time: Duration,
    pub deliveries_per_second: f64,
}

impl SimulationStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Simulation Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Group Members:             {:>30} ║", self.num_members);
        println!("║  Messages Sent:             {:>30} ║", self.num_messages);
        println!("║  Deliveries:                {:>30} ║", self.total_deliveries);
        println!("║  Evicted as Stable:         {:>30} ║", self.total_evicted);
        println!("║  Still Buffered:            {:>30} ║", self.still_buffered);
        println!("║  Join Phase:                {:>29}s ║", format!("{:.3}", self.join_time.as_secs_f64()));
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Send Time:         {:>28}µs ║", self.avg_send_time.as_micros());
        println!("║  Deliveries/Second:         {:>30.0} ║", self.deliveries_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

struct Member {
    engine: StableMulticast<MemoryTransport>,
    deliveries: mpsc::UnboundedReceiver<String>,
    events: broadcast::Receiver<GroupEvent>,
}

/// Generator that yields the index of the member sending next
fn sender_generator(num_members: usize, num_messages: usize) -> impl Stream<Item = usize> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_messages {
            yield rng.gen_range(0..num_members);
        }
    }
}

async fn wait_for_event(
    events: &mut broadcast::Receiver<GroupEvent>,
    what: &str,
    wanted: impl Fn(&GroupEvent) -> bool,
) -> Result<()> {
    let waited = timeout(SETTLE_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return Ok(()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SdkError::Transport("event channel closed".into()))
                }
            }
        }
    })
    .await;
    waited.map_err(|_| SdkError::Transport(format!("timed out waiting for {}", what)))?
}

/// Join members one at a time; each waits until every earlier member has
/// admitted it, so no join is ignored by a process still joining itself.
async fn form_group(network: &MemoryNetwork, num_members: usize) -> Result<Vec<Member>> {
    let mut members = Vec::with_capacity(num_members);
    for i in 0..num_members {
        let config = GroupConfigBuilder::new()
            .user_name(format!("member-{}", i))
            .capacity(num_members)
            .join_timeout(None)
            .build()?;
        let (deliver, deliveries) = ChannelDeliver::new();
        let engine = StableMulticast::new(config, Arc::new(network.attach_next()), deliver)?;
        let events = engine.subscribe();
        members.push(Member {
            engine,
            deliveries,
            events,
        });
    }

    let (first, rest) = members.split_at_mut(1);
    first[0].engine.start().await?;
    first[0].engine.found_group().await?;

    for i in 0..rest.len() {
        let (earlier, later) = rest.split_at_mut(i);
        let joiner = &mut later[0];
        joiner.engine.start().await?;
        wait_for_event(&mut joiner.events, "hello", |e| {
            matches!(e, GroupEvent::Joined { .. })
        })
        .await?;

        for member in first.iter_mut().chain(earlier.iter_mut()) {
            wait_for_event(&mut member.events, "admission", |e| {
                matches!(e, GroupEvent::MemberAdded { .. })
            })
            .await?;
        }
        debug!(joined = i + 1, "member joined");
    }
    Ok(members)
}

/// Count deliveries of simulated traffic until `expected` have arrived.
async fn drain(deliveries: &mut mpsc::UnboundedReceiver<String>, expected: usize) -> usize {
    let mut seen = 0;
    while seen < expected {
        match deliveries.recv().await {
            Some(text) if text.starts_with("Welcome ") => continue,
            Some(_) => seen += 1,
            None => break,
        }
    }
    seen
}

/// Form a group of `num_members` in memory and multicast `num_messages`
/// from randomly chosen senders.
pub async fn run_simulation(num_members: usize, num_messages: usize) -> Result<SimulationStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Stable Multicast Simulation                         ║");
    println!("║  Members: {} | Messages: {}", num_members, num_messages);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let network = MemoryNetwork::new();

    println!("\n[Phase 1/3] Forming group...");
    let mut members = form_group(&network, num_members).await?;
    let join_time = start.elapsed();
    println!("[Phase 1/3] ✓ {} members joined", members.len());

    println!("[Phase 2/3] Multicasting messages...");
    let mut send_times = Vec::with_capacity(num_messages);
    let mut senders = Box::pin(sender_generator(num_members, num_messages));
    let mut seq = 0;
    while let Some(idx) = senders.next().await {
        seq += 1;
        let sent_at = Instant::now();
        members[idx]
            .engine
            .send(format!("m{} from member-{}", seq, idx))
            .await?;
        send_times.push(sent_at.elapsed());

        if seq % 100 == 0 {
            println!("  Messages sent: {}/{}", seq, num_messages);
        }
    }
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Waiting for deliveries...");
    let drained = timeout(
        SETTLE_TIMEOUT,
        join_all(
            members
                .iter_mut()
                .map(|m| drain(&mut m.deliveries, num_messages)),
        ),
    )
    .await
    .map_err(|_| SdkError::Transport("timed out waiting for deliveries".into()))?;
    let total_deliveries: usize = drained.iter().sum();
    println!("[Phase 3/3] ✓ Completed");

    let still_buffered: usize = members
        .iter()
        .map(|m| m.engine.dump_state().buffer.len())
        .sum();
    for m in &members {
        m.engine.shutdown();
    }

    let total_time = start.elapsed();
    let avg_send_time = if !send_times.is_empty() {
        send_times.iter().sum::<Duration>() / send_times.len() as u32
    } else {
        Duration::ZERO
    };
    info!(
        members = num_members,
        messages = num_messages,
        deliveries = total_deliveries,
        "simulation finished"
    );

    Ok(SimulationStats {
        num_members,
        num_messages,
        total_deliveries,
        total_evicted: total_deliveries.saturating_sub(still_buffered),
        still_buffered,
        join_time,
        total_time,
        avg_send_time,
        deliveries_per_second: total_deliveries as f64 / total_time.as_secs_f64(),
    })
}

/// Run simulations over growing group sizes
pub async fn simulate_scaling(max_members: usize, step: usize, num_messages: usize) -> Result<()> {
    let mut results = Vec::new();
    let mut n = step.max(1);
    while n <= max_members {
        results.push(run_simulation(n, num_messages).await?);
        n += step.max(1);
    }

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║  Members │ Deliveries │   Time (s) │ Deliveries/s │ Buffered ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    for stats in &results {
        println!(
            "║  {:>7} │ {:>10} │ {:>10.3} │ {:>12.0} │ {:>8} ║",
            stats.num_members,
            stats.total_deliveries,
            stats.total_time.as_secs_f64(),
            stats.deliveries_per_second,
            stats.still_buffered
        );
    }
    println!("╚════════════════════════════════════════════════════════════╝");
    Ok(())
}
