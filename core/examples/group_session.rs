//! Scripted group session demo
//!
//! Builds a small causal history by hand (a founder, two invited members,
//! some chatter and a pair of mutually-hostile removals), then replays it and
//! prints the state every replica would agree on.
//!
//! Run with: cargo run --example group_session

use darc_core::app::App;
use darc_core::crdt::{Crdt, OpDraft};
use darc_core::hashgraph::Hashgraph;
use darc_core::types::UserId;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let alice = UserId::new();
    let bob = UserId::new();
    let carol = UserId::new();

    let mut graph = Hashgraph::new();
    let root = graph.add_node(OpDraft::init(alice, "Alice"), &[]);
    let add_bob = graph.add_node(
        OpDraft::add(alice, bob, "Bob", (0..20).collect()),
        &[root],
    );
    let hello = graph.add_node(
        OpDraft::post(alice, "Alice: Hello Bob, I gave you 20 points"),
        &[add_bob],
    );
    let aye = graph.add_node(OpDraft::post(bob, "Bob: Aye aye captain!"), &[hello]);
    let add_carol = graph.add_node(
        OpDraft::add(alice, carol, "Carol", (20..520).collect()),
        &[aye],
    );
    let grumble = graph.add_node(
        OpDraft::post(bob, "Bob: How come Carol gets 500 points while I get 20"),
        &[add_carol],
    );
    // Alice and Carol turn on each other at the same depth: the replay
    // settles the conflict with a coin weighted by point ownership.
    let rem_ac = graph.add_node(OpDraft::remove(alice, carol), &[grumble]);
    let rem_ca = graph.add_node(OpDraft::remove(carol, alice), &[grumble]);
    graph.add_node(
        OpDraft::post(bob, "Bob: Wow, that was close!"),
        &[rem_ac, rem_ca],
    );

    let num_points = 1000;
    let threshold = 2;
    let mut crdt = Crdt::new();
    graph.run(3, root, &mut crdt);
    let app = App::execute(&crdt, num_points, threshold)?;

    println!("message log:");
    for msg in &app.messages {
        println!("  {}", msg.content);
    }

    println!("\nmembers:");
    let mut members: Vec<_> = app.users.values().collect();
    members.sort_by_key(|u| u.id);
    for user in members {
        println!("  {} owns {} points", user.id, user.points.len());
    }

    Ok(())
}
