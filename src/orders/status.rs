//! Order status codes, their customer-facing descriptions and the
//! allowed transitions between them

use serde::Serialize;

use crate::core::error::TransitionError;

/// Known order status codes
///
/// Variants are listed in happy-path order; `Cancelled` sits outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    PendingPayment50,
    DepositPaid,
    Processing,
    ShippedToHn,
    InCustoms,
    ReadyForDelivery,
    PaidFull,
    Completed,
    Cancelled,
}

/// Customer-facing view of a status code; never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDescriptor {
    pub label: &'static str,
    /// 0 to 100
    pub progress: u8,
    pub description: &'static str,
}

/// Descriptor used for codes that are not recognized
pub const FALLBACK_DESCRIPTOR: StatusDescriptor = StatusDescriptor {
    label: "En proceso",
    progress: 20,
    description: "Tu pedido está siendo procesado. Te avisaremos de cualquier novedad.",
};

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::PendingPayment50,
        OrderStatus::DepositPaid,
        OrderStatus::Processing,
        OrderStatus::ShippedToHn,
        OrderStatus::InCustoms,
        OrderStatus::ReadyForDelivery,
        OrderStatus::PaidFull,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Status of a freshly created order
    pub const INITIAL: OrderStatus = OrderStatus::PendingPayment50;

    pub fn code(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment50 => "pending_payment_50",
            OrderStatus::DepositPaid => "deposit_paid",
            OrderStatus::Processing => "processing",
            OrderStatus::ShippedToHn => "shipped_to_hn",
            OrderStatus::InCustoms => "in_customs",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::PaidFull => "paid_full",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored code; matching ignores case and surrounding whitespace
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.code().eq_ignore_ascii_case(code))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Position along the happy path; `None` for `Cancelled`
    fn rank(&self) -> Option<usize> {
        match self {
            OrderStatus::Cancelled => None,
            other => Self::ALL.iter().position(|s| s == other),
        }
    }

    /// Whether an admin may move an order from `self` to `next`
    ///
    /// - staying in the same state is always allowed (no-op)
    /// - forward moves along the happy path are allowed, skips included
    /// - any non-terminal state may be cancelled
    /// - terminal states have no exits
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if next == OrderStatus::Cancelled {
            return true;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    pub fn descriptor(&self) -> StatusDescriptor {
        match self {
            OrderStatus::PendingPayment50 => StatusDescriptor {
                label: "Pendiente de anticipo",
                progress: 10,
                description: "Recibimos tu pedido. Para procesarlo necesitamos la confirmación del anticipo del 50%.",
            },
            OrderStatus::DepositPaid => StatusDescriptor {
                label: "Anticipo recibido",
                progress: 25,
                description: "Confirmamos tu anticipo. Tu pedido entra a la cola de preparación.",
            },
            OrderStatus::Processing => StatusDescriptor {
                label: "En preparación",
                progress: 40,
                description: "Estamos preparando tus camisetas con el proveedor.",
            },
            OrderStatus::ShippedToHn => StatusDescriptor {
                label: "En camino a Honduras",
                progress: 55,
                description: "Tu pedido va en camino hacia Honduras.",
            },
            OrderStatus::InCustoms => StatusDescriptor {
                label: "En aduana",
                progress: 70,
                description: "Tu pedido llegó al país y está en proceso de desaduanaje.",
            },
            OrderStatus::ReadyForDelivery => StatusDescriptor {
                label: "Listo para entrega",
                progress: 85,
                description: "Tu pedido está listo. Coordinaremos contigo el pago restante y la entrega.",
            },
            OrderStatus::PaidFull => StatusDescriptor {
                label: "Pagado",
                progress: 95,
                description: "Recibimos el pago completo. Tu pedido sale a entrega.",
            },
            OrderStatus::Completed => StatusDescriptor {
                label: "Entregado",
                progress: 100,
                description: "Tu pedido fue entregado. ¡Gracias por tu compra!",
            },
            OrderStatus::Cancelled => StatusDescriptor {
                label: "Cancelado",
                progress: 0,
                description: "Este pedido fue cancelado. Escríbenos si tienes dudas.",
            },
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Map any stored code to its descriptor; unknown codes get the fallback
pub fn describe(code: &str) -> StatusDescriptor {
    OrderStatus::from_code(code)
        .map(|status| status.descriptor())
        .unwrap_or(FALLBACK_DESCRIPTOR)
}

/// An accepted status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Stored code before the change, verbatim
    pub from: String,
    pub to: OrderStatus,
    /// The move is outside the transition table and was forced by an admin
    pub forced: bool,
}

/// Decide whether an order with stored code `current` may move to `requested`
///
/// Returns `Ok(None)` when the order already has the requested status.
/// Orders whose stored code is unknown may move anywhere.
pub fn plan_transition(
    current: &str,
    requested: OrderStatus,
    force: bool,
) -> Result<Option<TransitionPlan>, TransitionError> {
    let plan = |forced| {
        Some(TransitionPlan {
            from: current.to_string(),
            to: requested,
            forced,
        })
    };

    let Some(from) = OrderStatus::from_code(current) else {
        tracing::warn!(
            from = current,
            to = requested.code(),
            "moving order out of an unknown status"
        );
        return Ok(plan(false));
    };

    if from == requested {
        return Ok(None);
    }
    if from.can_transition_to(requested) {
        return Ok(plan(false));
    }
    if force {
        tracing::warn!(
            from = from.code(),
            to = requested.code(),
            "forcing status change outside the workflow"
        );
        return Ok(plan(true));
    }

    Err(TransitionError::NotAllowed {
        from: from.code().to_string(),
        to: requested.code().to_string(),
    })
}
