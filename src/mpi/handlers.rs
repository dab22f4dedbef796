//! MPI 端点状态机
//!
//! 从 trace 拉取操作并分派；每个前向处理器都有配对的逆向处理器，
//! 随机抽取、计数器与队列结构的改动全部可撤销。

use super::op::{MpiOp, OpKind, ReqId};
use super::queues::QueueEntry;
use super::state::{EndpointState, ProcessedItem};
use super::wait::{PendingWait, WaitKind};
use crate::net::mapping::DragonflyMapping;
use crate::net::message::{EventKind, TerminalMsg};
use crate::sim::EventCtx;
use crate::workload::{JobAlloc, Workload};
use tracing::trace;

type Ctx<'a> = EventCtx<'a, TerminalMsg>;

fn issue_next_event(noise: f64, ctx: &mut Ctx<'_>) {
    let ts = ctx.lookahead() + 0.1 + ctx.rand_exponential(noise);
    ctx.schedule_self(ts, TerminalMsg::new(EventKind::MpiOpGetNext));
}

fn issue_next_event_rc(ctx: &mut Ctx<'_>) {
    ctx.rand_reverse();
}

/// 对照未决等待检查一个完成的请求；等待组满足时返回 true。
fn notify_posted_wait(
    s: &mut EndpointState,
    msg: &mut TerminalMsg,
    completed_req: ReqId,
) -> bool {
    msg.wait_completed = false;
    let Some(wait) = s.wait_op.as_mut() else {
        return false;
    };
    match wait.kind {
        WaitKind::Wait => wait.req_ids[0] == completed_req,
        WaitKind::Waitall | WaitKind::Waitany | WaitKind::Waitsome => {
            let mut satisfied = false;
            for i in 0..wait.count {
                if wait.req_ids[i] == completed_req {
                    wait.num_completed += 1;
                    assert!(
                        wait.num_completed <= wait.count,
                        "wait group overcompleted: {} of {}",
                        wait.num_completed,
                        wait.count
                    );
                    if wait.num_completed == wait.count {
                        satisfied = true;
                    }
                    msg.wait_completed = true;
                }
            }
            satisfied
        }
    }
}

/// 从完成列表摘除等待组引用的请求；摘除位置随值一起进 rc-stack。
fn clear_completed_reqs(s: &mut EndpointState, ctx: &Ctx<'_>, reqs: &[ReqId]) -> u32 {
    let mut matched = 0;
    for &req in reqs {
        if let Some(idx) = s.completed_reqs.iter().position(|&r| r == req) {
            s.completed_reqs.remove(idx);
            s.matched_reqs.push(ctx.now(), (req, idx));
            matched += 1;
        }
    }
    matched
}

fn add_completed_reqs(s: &mut EndpointState, count: u32) {
    // 按摘除的逆序弹栈并插回原下标，精确恢复列表布局。
    for _ in 0..count {
        let (req, idx) = s
            .matched_reqs
            .pop()
            .expect("matched_reqs rc stack underflow");
        let idx = idx.min(s.completed_reqs.len());
        s.completed_reqs.insert(idx, req);
    }
}

/// 一个非阻塞请求完成：满足等待或记入完成列表。
pub fn update_completed_queue(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    req_id: ReqId,
) {
    msg.num_matched = 0;

    let waiting = notify_posted_wait(s, msg, req_id);
    if !waiting {
        msg.flags.c0 = true;
        s.completed_reqs.push_back(req_id);
    } else {
        msg.flags.c1 = true;
        let wait = s.wait_op.take().expect("satisfied wait must exist");
        msg.num_matched = clear_completed_reqs(s, ctx, &wait.req_ids[..wait.count]);
        msg.save.wait_time = s.wait_time;
        s.wait_time += ctx.now() - wait.start_time;
        s.processed_ops.push(ctx.now(), ProcessedItem::Wait(wait));
        issue_next_event(noise, ctx);
    }
}

pub fn update_completed_queue_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    if msg.flags.c0 {
        s.completed_reqs.pop_back();
    } else if msg.flags.c1 {
        let Some(ProcessedItem::Wait(wait)) = s.processed_ops.pop() else {
            panic!("rc stack mismatch: expected wait group");
        };
        s.wait_op = Some(wait);
        s.wait_time = msg.save.wait_time;
        add_completed_reqs(s, msg.num_matched);
        issue_next_event_rc(ctx);
    }
    if msg.wait_completed {
        let wait = s.wait_op.as_mut().expect("wait group restored");
        wait.num_completed -= 1;
    }
}

/// SEND / ISEND：把消息交给网卡并（ISEND）继续读 trace。
fn exec_mpi_send(
    s: &mut EndpointState,
    alloc: &JobAlloc,
    map: &DragonflyMapping,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    src: i32,
    dest: i32,
    tag: i32,
    bytes: u64,
    req_id: ReqId,
    kind: OpKind,
) {
    msg.save.num_bytes = bytes;
    let global_dest = alloc.global_rank(s.app_id, dest as usize);
    let dest_lp = map.rank_to_endpoint_lp(global_dest);

    s.num_bytes_sent += bytes;

    let mut r#gen = TerminalMsg::new(EventKind::TGenerate);
    r#gen.op_kind = kind;
    r#gen.src_rank = src;
    r#gen.dest_rank = dest;
    r#gen.tag = tag;
    r#gen.bytes = bytes;
    r#gen.req_id = req_id;
    r#gen.sim_start_time = ctx.now();
    r#gen.packet_size = bytes;
    r#gen.chunk_id = 0;
    r#gen.sender_lp = ctx.self_lp();
    r#gen.dest_terminal_id = global_dest;
    r#gen.dest_terminal_lp = dest_lp;

    let lat = ctx.local_latency();
    ctx.schedule_self(lat, r#gen);

    if kind == OpKind::Isend {
        issue_next_event(noise, ctx);
    }
}

fn exec_mpi_send_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    ctx.local_latency_reverse();
    if msg.op_kind == OpKind::Isend {
        issue_next_event_rc(ctx);
    }
    s.num_bytes_sent -= msg.save.num_bytes;
}

/// RECV / IRECV：先在到达队列找配对，找不到则挂入未决接收。
fn exec_mpi_recv(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    src: i32,
    dest: i32,
    tag: i32,
    bytes: u64,
    req_id: ReqId,
    kind: OpKind,
) {
    msg.save.recv_time = s.recv_time;
    msg.save.num_bytes = bytes;

    let recv_op = QueueEntry {
        op_kind: kind,
        tag,
        source_rank: src,
        dest_rank: dest,
        bytes,
        req_init_time: ctx.now(),
        req_id,
    };

    match s.arrival_queue.find_match_for_recv(&recv_op) {
        Some(index) => {
            msg.found_match = Some(index);
            let arrived_init = s
                .arrival_queue
                .get(index)
                .expect("match index valid")
                .req_init_time;
            s.recv_time += ctx.now() - arrived_init;
            if kind == OpKind::Irecv {
                update_completed_queue(s, noise, msg, ctx, req_id);
            }
            let arrived = s.arrival_queue.remove_at(index);
            s.processed_ops.push(ctx.now(), ProcessedItem::Queued(arrived));
            issue_next_event(noise, ctx);
        }
        None => {
            msg.found_match = None;
            s.pending_recvs_queue.push_back(recv_op);
            // 非阻塞接收继续读 trace；阻塞接收停在这里等到达。
            if kind == OpKind::Irecv {
                issue_next_event(noise, ctx);
            }
        }
    }
}

fn exec_mpi_recv_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    s.recv_time = msg.save.recv_time;
    match msg.found_match {
        Some(index) => {
            let Some(ProcessedItem::Queued(arrived)) = s.processed_ops.pop() else {
                panic!("rc stack mismatch: expected removed arrival");
            };
            s.arrival_queue.insert_at(index, arrived);
            if msg.op_kind == OpKind::Irecv {
                update_completed_queue_rc(s, msg, ctx);
            }
            issue_next_event_rc(ctx);
        }
        None => {
            s.pending_recvs_queue.pop_back();
            if msg.op_kind == OpKind::Irecv {
                issue_next_event_rc(ctx);
            }
        }
    }
}

/// WAIT：已完成则立即越过，否则占用唯一的等待槽。
fn exec_mpi_wait(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    req_id: ReqId,
) {
    assert!(s.wait_op.is_none(), "second wait installed while one is live");
    if let Some(idx) = s.completed_reqs.iter().position(|&r| r == req_id) {
        s.completed_reqs.remove(idx);
        s.processed_ops
            .push(ctx.now(), ProcessedItem::Completed { req_id, index: idx });
        msg.found_match = Some(idx);
        issue_next_event(noise, ctx);
        return;
    }
    msg.found_match = None;
    s.wait_op = Some(PendingWait::new(
        WaitKind::Wait,
        vec![req_id],
        0,
        ctx.now(),
    ));
}

fn exec_mpi_wait_rc(s: &mut EndpointState, ctx: &mut Ctx<'_>) {
    if s.wait_op.is_some() {
        s.wait_op = None;
    } else {
        issue_next_event_rc(ctx);
        let Some(ProcessedItem::Completed { req_id, index }) = s.processed_ops.pop() else {
            panic!("rc stack mismatch: expected completed request");
        };
        let index = index.min(s.completed_reqs.len());
        s.completed_reqs.insert(index, req_id);
    }
}

/// WAITALL：全部已完成则摘除并继续，否则装入等待槽。
fn exec_mpi_wait_all(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    req_ids: &[ReqId],
    kind: WaitKind,
) {
    assert!(s.wait_op.is_none(), "second wait installed while one is live");
    let count = req_ids.len();
    assert!(
        count < super::wait::MAX_WAIT_REQS,
        "waitall of {count} requests exceeds MAX_WAIT_REQS"
    );

    let num_matched = req_ids
        .iter()
        .filter(|&&req| s.completed_reqs.contains(&req))
        .count();

    if num_matched == count {
        msg.num_matched = clear_completed_reqs(s, ctx, req_ids);
        issue_next_event(noise, ctx);
    } else {
        s.wait_op = Some(PendingWait::new(
            kind,
            req_ids.to_vec(),
            num_matched,
            ctx.now(),
        ));
    }
}

fn exec_mpi_wait_all_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    if s.wait_op.is_some() {
        s.wait_op = None;
    } else {
        add_completed_reqs(s, msg.num_matched);
        issue_next_event_rc(ctx);
    }
}

/// 计算延迟：推进 compute_time 并在延迟之后继续读 trace。
fn exec_comp_delay(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
    seconds: f64,
) {
    msg.save.delay = s.compute_time;
    let delay_ns = seconds * 1_000_000_000.0;
    s.compute_time += delay_ns;
    let ts = delay_ns + ctx.lookahead() + 0.1 + ctx.rand_exponential(noise);
    ctx.schedule_self(ts, TerminalMsg::new(EventKind::MpiOpGetNext));
}

/// 发送方本地回执：阻塞 SEND 解除，ISEND 记请求完成。
pub fn on_send_posted(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    match msg.op_kind {
        OpKind::Send => issue_next_event(noise, ctx),
        OpKind::Isend => update_completed_queue(s, noise, msg, ctx, msg.req_id),
        other => panic!("send-posted echo for non-send op {other:?}"),
    }
}

pub fn on_send_posted_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    match msg.op_kind {
        OpKind::Send => issue_next_event_rc(ctx),
        OpKind::Isend => update_completed_queue_rc(s, msg, ctx),
        other => panic!("send-posted echo for non-send op {other:?}"),
    }
}

/// 消息到达接收端：回调发送方，然后尝试与未决接收配对。
pub fn update_arrival_queue(
    s: &mut EndpointState,
    noise: f64,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    msg.save.recv_time = s.recv_time;
    s.num_bytes_recvd += msg.bytes;

    let lat = ctx.local_latency();
    let mut cb = TerminalMsg::new(EventKind::MpiSendArrivedCb);
    cb.msg_send_time = ctx.now() - msg.sim_start_time;
    ctx.schedule(msg.sender_lp, lat, cb);

    let arrived = QueueEntry {
        op_kind: msg.op_kind,
        tag: msg.tag,
        source_rank: msg.src_rank,
        dest_rank: msg.dest_rank,
        bytes: msg.bytes,
        req_init_time: msg.sim_start_time,
        req_id: msg.req_id,
    };

    match s.pending_recvs_queue.find_match_for_arrival(&arrived) {
        Some(index) => {
            msg.found_match = Some(index);
            let (p_kind, p_req, p_init) = {
                let p = s.pending_recvs_queue.get(index).expect("match index valid");
                (p.op_kind, p.req_id, p.req_init_time)
            };
            s.recv_time += ctx.now() - p_init;
            if p_kind == OpKind::Irecv {
                update_completed_queue(s, noise, msg, ctx, p_req);
            } else {
                // 配对的是阻塞接收：接收方停在这条 recv 上，需要唤醒。
                msg.flags.c2 = true;
                issue_next_event(noise, ctx);
            }
            let pending = s.pending_recvs_queue.remove_at(index);
            s.processed_ops.push(ctx.now(), ProcessedItem::Queued(pending));
        }
        None => {
            msg.found_match = None;
            s.arrival_queue.push_back(arrived);
        }
    }
}

pub fn update_arrival_queue_rc(s: &mut EndpointState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    s.recv_time = msg.save.recv_time;
    s.num_bytes_recvd -= msg.bytes;
    ctx.local_latency_reverse();

    match msg.found_match {
        Some(index) => {
            let Some(ProcessedItem::Queued(pending)) = s.processed_ops.pop() else {
                panic!("rc stack mismatch: expected removed pending recv");
            };
            let p_kind = pending.op_kind;
            s.pending_recvs_queue.insert_at(index, pending);
            if p_kind == OpKind::Irecv {
                update_completed_queue_rc(s, msg, ctx);
            } else if msg.flags.c2 {
                issue_next_event_rc(ctx);
            }
        }
        None => {
            s.arrival_queue.pop_back();
        }
    }
}

/// 发送完成回调：把网络上报的耗时累入发送方的 send_time。
pub fn update_message_time(s: &mut EndpointState, msg: &mut TerminalMsg) {
    msg.save.send_time = s.send_time;
    s.send_time += msg.msg_send_time;
}

pub fn update_message_time_rc(s: &mut EndpointState, msg: &TerminalMsg) {
    s.send_time = msg.save.send_time;
}

/// 从 trace 拉下一个操作并分派。
#[allow(clippy::too_many_arguments)]
pub fn next_operation(
    s: &mut EndpointState,
    workload: &mut dyn Workload,
    alloc: &JobAlloc,
    map: &DragonflyMapping,
    noise: f64,
    disable_delay: bool,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    let op = workload.next_op(s.app_id, s.local_rank);
    msg.op_kind = op.kind();
    trace!(rank = s.rank_id, op = ?msg.op_kind, "next trace operation");

    match op {
        MpiOp::End => {
            msg.save.elapsed = s.elapsed_time;
            s.elapsed_time = ctx.now() - s.start_time;
            s.wrkld_end = true;
        }
        MpiOp::Send {
            src,
            dest,
            tag,
            bytes,
            req_id,
        }
        | MpiOp::Isend {
            src,
            dest,
            tag,
            bytes,
            req_id,
        } => {
            s.num_sends += 1;
            let kind = msg.op_kind;
            exec_mpi_send(s, alloc, map, noise, msg, ctx, src, dest, tag, bytes, req_id, kind);
        }
        MpiOp::Recv {
            src,
            dest,
            tag,
            bytes,
            req_id,
        }
        | MpiOp::Irecv {
            src,
            dest,
            tag,
            bytes,
            req_id,
        } => {
            s.num_recvs += 1;
            let kind = msg.op_kind;
            exec_mpi_recv(s, noise, msg, ctx, src, dest, tag, bytes, req_id, kind);
        }
        MpiOp::Delay { seconds } => {
            s.num_delays += 1;
            if disable_delay {
                issue_next_event(noise, ctx);
            } else {
                exec_comp_delay(s, noise, msg, ctx, seconds);
            }
        }
        MpiOp::Waitany { .. } | MpiOp::Waitsome { .. } => {
            s.num_waitsome += 1;
            issue_next_event(noise, ctx);
        }
        MpiOp::Wait { req_id } => {
            s.num_wait += 1;
            exec_mpi_wait(s, noise, msg, ctx, req_id);
        }
        MpiOp::Waitall { req_ids } => {
            s.num_waitall += 1;
            exec_mpi_wait_all(s, noise, msg, ctx, &req_ids, WaitKind::Waitall);
        }
        MpiOp::Collective { .. } => {
            s.num_cols += 1;
            issue_next_event(noise, ctx);
        }
    }
}

pub fn next_operation_rc(
    s: &mut EndpointState,
    workload: &mut dyn Workload,
    disable_delay: bool,
    msg: &TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    workload.next_op_rc(s.app_id, s.local_rank);

    match msg.op_kind {
        OpKind::End => {
            s.elapsed_time = msg.save.elapsed;
            s.wrkld_end = false;
        }
        OpKind::Send | OpKind::Isend => {
            exec_mpi_send_rc(s, msg, ctx);
            s.num_sends -= 1;
        }
        OpKind::Recv | OpKind::Irecv => {
            exec_mpi_recv_rc(s, msg, ctx);
            s.num_recvs -= 1;
        }
        OpKind::Delay => {
            s.num_delays -= 1;
            issue_next_event_rc(ctx);
            if !disable_delay {
                s.compute_time = msg.save.delay;
            }
        }
        OpKind::Waitany | OpKind::Waitsome => {
            s.num_waitsome -= 1;
            issue_next_event_rc(ctx);
        }
        OpKind::Wait => {
            s.num_wait -= 1;
            exec_mpi_wait_rc(s, ctx);
        }
        OpKind::Waitall => {
            s.num_waitall -= 1;
            exec_mpi_wait_all_rc(s, msg, ctx);
        }
        kind if kind.is_collective() => {
            s.num_cols -= 1;
            issue_next_event_rc(ctx);
        }
        kind => panic!("invalid op type {kind:?} in reverse dispatch"),
    }
}
