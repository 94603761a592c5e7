use anyhow::{Result, bail};
use ticketreg_core::Ticket;
use ticketreg_registry::{CacheTicketRegistry, TicketRegistry, ttl_seconds};
use time::OffsetDateTime;

use crate::cli::{DeleteArgs, OutputFormat};
use crate::output::{print_field, print_json, print_success, print_warning};

async fn fetch(registry: &CacheTicketRegistry, ticket_id: &str) -> Result<Ticket> {
    match registry.get_ticket(ticket_id).await? {
        Some(ticket) => Ok(ticket),
        None => bail!("Ticket not found: {ticket_id}"),
    }
}

pub async fn get(registry: &CacheTicketRegistry, ticket_id: &str, format: OutputFormat) -> Result<()> {
    let ticket = fetch(registry, ticket_id).await?;

    match format {
        OutputFormat::Json => print_json(&ticket)?,
        OutputFormat::Text => {
            let now = OffsetDateTime::now_utc();
            let state = ticket.state();

            print_field("Id", ticket.id());
            print_field("Kind", ticket.kind());
            print_field("Created", state.created_at);
            print_field("Last used", state.last_used_at);
            print_field("Uses", state.use_count);
            match ticket.time_to_live(now) {
                Some(ttl) => print_field("Expires in", format!("{}s", ttl_seconds(Some(ttl)))),
                None => print_field("Expires in", "never"),
            }

            match &ticket {
                Ticket::TicketGranting(tgt) => {
                    print_field("Principal", &tgt.authentication.principal);
                    print_field("Services granted", tgt.services.len());
                    print_field("Proxy granting", tgt.proxy_granting_tickets.len());
                }
                Ticket::Service(st) => {
                    print_field("Service", &st.service);
                    print_field("Granted by", &st.granting_ticket_id);
                }
                Ticket::ProxyGranting(pgt) => {
                    print_field("Proxied by", &pgt.proxied_by);
                    print_field("Granted by", &pgt.granting_ticket_id);
                }
                Ticket::Proxy(pt) => {
                    print_field("Service", &pt.service);
                    print_field("Granted by", &pt.granting_ticket_id);
                }
            }

            if ticket.is_expired(now) {
                print_warning("Ticket is past its expiration policy");
            }
        }
    }
    Ok(())
}

pub async fn delete(registry: &CacheTicketRegistry, args: &DeleteArgs) -> Result<()> {
    if args.tree {
        let removed = registry.delete_ticket_tree(&args.ticket_id).await?;
        if removed == 0 {
            print_warning(&format!("Ticket not found: {}", args.ticket_id));
        } else {
            print_success(&format!("Deleted {removed} ticket(s)"));
        }
    } else if registry.delete_ticket(&args.ticket_id).await? {
        print_success(&format!("Deleted {}", args.ticket_id));
    } else {
        print_warning(&format!("Ticket not found: {}", args.ticket_id));
    }
    Ok(())
}

pub async fn touch(registry: &CacheTicketRegistry, ticket_id: &str) -> Result<()> {
    let ticket = fetch(registry, ticket_id).await?;
    if !registry.update_ticket_expiration(&ticket).await? {
        bail!("Ticket disappeared before its expiration could be updated: {ticket_id}");
    }
    let ttl = ticket.time_to_live(OffsetDateTime::now_utc());
    print_success(&format!("Expiration updated (ttl {}s)", ttl_seconds(ttl)));
    Ok(())
}
