//! 仿真世界
//!
//! 持有全部 LP（端点与路由器），按 (LP 种类, 事件种类) 分派前向/逆向处理器。

use crate::mpi::{self, EndpointState};
use crate::net::mapping::DragonflyMapping;
use crate::net::message::{EventKind, TerminalMsg};
use crate::net::params::DragonflyParams;
use crate::net::router::{self, RouterState};
use crate::net::terminal;
use crate::sim::{EventCtx, Model, SimTime, Simulator};
use crate::workload::{JobAlloc, Workload};

pub enum Lp {
    Endpoint(EndpointState),
    Router(RouterState),
}

pub struct World {
    pub params: DragonflyParams,
    pub mapping: DragonflyMapping,
    pub workload: Box<dyn Workload>,
    pub alloc: JobAlloc,
    pub lps: Vec<Lp>,
    pub noise: f64,
    pub disable_delay: bool,
}

impl World {
    pub fn new(
        params: DragonflyParams,
        workload: Box<dyn Workload>,
        alloc: JobAlloc,
        noise: f64,
        disable_delay: bool,
    ) -> Self {
        let mapping = DragonflyMapping::new(params.num_cn, params.total_routers);
        let mut lps = Vec::with_capacity(mapping.num_lps());
        for lp in 0..mapping.num_lps() {
            if mapping.is_router_lp(lp) {
                lps.push(Lp::Router(RouterState::new(
                    mapping.router_lp_to_id(lp),
                    &params,
                )));
            } else {
                let rank = mapping.endpoint_lp_to_rank(lp);
                let mut s = EndpointState::new(rank, &params);
                if let Some((app, local)) = alloc.lookup(rank) {
                    s.active = true;
                    s.app_id = app;
                    s.local_rank = local;
                }
                lps.push(Lp::Endpoint(s));
            }
        }
        World {
            params,
            mapping,
            workload,
            alloc,
            lps,
            noise,
            disable_delay,
        }
    }

    /// 给所有活跃端点注入首个取操作事件。
    pub fn prime(&self, sim: &mut Simulator<TerminalMsg>) {
        for (lp, state) in self.lps.iter().enumerate() {
            if let Lp::Endpoint(s) = state {
                if s.active {
                    sim.schedule(lp, SimTime::ZERO, TerminalMsg::new(EventKind::MpiOpGetNext));
                }
            }
        }
    }

    pub fn endpoint(&self, lp: usize) -> &EndpointState {
        match &self.lps[lp] {
            Lp::Endpoint(s) => s,
            Lp::Router(_) => panic!("lp {lp} is a router"),
        }
    }

    pub fn router(&self, lp: usize) -> &RouterState {
        match &self.lps[lp] {
            Lp::Router(r) => r,
            Lp::Endpoint(_) => panic!("lp {lp} is an endpoint"),
        }
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (usize, &EndpointState)> {
        self.lps.iter().enumerate().filter_map(|(lp, s)| match s {
            Lp::Endpoint(e) => Some((lp, e)),
            Lp::Router(_) => None,
        })
    }

    pub fn routers(&self) -> impl Iterator<Item = (usize, &RouterState)> {
        self.lps.iter().enumerate().filter_map(|(lp, s)| match s {
            Lp::Router(r) => Some((lp, r)),
            Lp::Endpoint(_) => None,
        })
    }

    /// 静止判据：所有路由器与网卡的 VC 占用归零、状态空闲。
    pub fn network_quiescent(&self) -> bool {
        self.routers().all(|(_, r)| r.quiescent())
            && self.endpoints().all(|(_, e)| e.nic.quiescent())
    }
}

impl Model for World {
    type Msg = TerminalMsg;

    fn forward(&mut self, lp: usize, msg: &mut TerminalMsg, ctx: &mut EventCtx<'_, TerminalMsg>) {
        let World {
            params,
            mapping,
            workload,
            alloc,
            lps,
            noise,
            disable_delay,
        } = self;
        msg.flags.clear();
        match &mut lps[lp] {
            Lp::Endpoint(s) => {
                s.processed_ops.gc(ctx.gvt());
                s.matched_reqs.gc(ctx.gvt());
                match msg.kind {
                    EventKind::MpiOpGetNext => mpi::next_operation(
                        s,
                        workload.as_mut(),
                        alloc,
                        mapping,
                        *noise,
                        *disable_delay,
                        msg,
                        ctx,
                    ),
                    EventKind::MpiSendArrived => mpi::update_arrival_queue(s, *noise, msg, ctx),
                    EventKind::MpiSendArrivedCb => mpi::update_message_time(s, msg),
                    EventKind::MpiSendPosted => mpi::on_send_posted(s, *noise, msg, ctx),
                    EventKind::TGenerate => terminal::packet_generate(&mut s.nic, params, msg, ctx),
                    EventKind::TSend => {
                        terminal::packet_send(&mut s.nic, params, mapping, msg, ctx)
                    }
                    EventKind::TArrive => terminal::packet_arrive(&mut s.nic, params, msg, ctx),
                    EventKind::TBuffer => terminal::terminal_buf_update(&mut s.nic, params, msg),
                    other => panic!("endpoint LP {lp} received router event {other:?}"),
                }
            }
            Lp::Router(r) => match msg.kind {
                EventKind::RArrive => router::router_packet_receive(r, params, msg, ctx),
                EventKind::RSend => router::router_packet_send(r, params, mapping, msg, ctx),
                EventKind::RBuffer => router::router_buf_update(r, params, msg),
                other => panic!("router LP {lp} received endpoint event {other:?}"),
            },
        }
    }

    fn reverse(&mut self, lp: usize, msg: &mut TerminalMsg, ctx: &mut EventCtx<'_, TerminalMsg>) {
        let World {
            params,
            workload,
            lps,
            disable_delay,
            ..
        } = self;
        match &mut lps[lp] {
            Lp::Endpoint(s) => match msg.kind {
                EventKind::MpiOpGetNext => {
                    mpi::next_operation_rc(s, workload.as_mut(), *disable_delay, msg, ctx)
                }
                EventKind::MpiSendArrived => mpi::update_arrival_queue_rc(s, msg, ctx),
                EventKind::MpiSendArrivedCb => mpi::update_message_time_rc(s, msg),
                EventKind::MpiSendPosted => mpi::on_send_posted_rc(s, msg, ctx),
                EventKind::TGenerate => terminal::packet_generate_rc(msg, ctx),
                EventKind::TSend => terminal::packet_send_rc(&mut s.nic, msg, ctx),
                EventKind::TArrive => terminal::packet_arrive_rc(&mut s.nic, msg, ctx),
                EventKind::TBuffer => terminal::terminal_buf_update_rc(&mut s.nic, params, msg),
                other => panic!("endpoint LP {lp} received router event {other:?}"),
            },
            Lp::Router(r) => match msg.kind {
                EventKind::RArrive => router::router_packet_receive_rc(r, params, msg, ctx),
                EventKind::RSend => router::router_packet_send_rc(r, params, msg, ctx),
                EventKind::RBuffer => router::router_buf_update_rc(r, params, msg),
                other => panic!("router LP {lp} received endpoint event {other:?}"),
            },
        }
    }
}
