//! Property tests for the marker-script codec.

use proptest::prelude::*;

use transfer_domain::domain::{
    Amount, Domain, DomainAddress, MAX_MONEY, TokenAmount, TransferDomainError,
    TransferDomainPayload, TransferItem, TransferLeg, codec,
};

fn address() -> impl Strategy<Value = DomainAddress> {
    prop_oneof![
        any::<[u8; 20]>().prop_map(|pubkey_hash| DomainAddress::Legacy { pubkey_hash }),
        any::<[u8; 20]>().prop_map(|program| DomainAddress::Segwit { program }),
        any::<[u8; 20]>().prop_map(|address| DomainAddress::Evm { address }),
    ]
}

fn domain() -> impl Strategy<Value = Domain> {
    prop_oneof![Just(Domain::Dvm), Just(Domain::Evm)]
}

fn leg() -> impl Strategy<Value = TransferLeg> {
    (
        address(),
        any::<u32>(),
        1..=MAX_MONEY,
        domain(),
        prop::collection::vec(any::<u8>(), 0..4),
    )
        .prop_map(|(address, token_id, units, domain, data)| {
            let amount = TokenAmount::new(token_id, Amount::from_units(units).unwrap()).unwrap();
            TransferLeg::new(address, amount, domain).with_data(data)
        })
}

fn payload() -> impl Strategy<Value = TransferDomainPayload> {
    prop::collection::vec((leg(), leg()), 1..4).prop_map(|pairs| {
        TransferDomainPayload::new(
            pairs
                .into_iter()
                .map(|(src, dst)| TransferItem::new(src, dst))
                .collect(),
        )
        .unwrap()
    })
}

proptest! {
    #[test]
    fn decode_inverts_encode(payload in payload()) {
        let script = codec::encode(&payload);
        prop_assert_eq!(codec::decode(script.as_bytes()).unwrap(), payload.clone());
        prop_assert_eq!(codec::encode(&payload), script);
    }

    #[test]
    fn truncated_scripts_never_decode(payload in payload(), cut in 1usize..16) {
        let bytes = codec::encode(&payload).into_bytes();
        let cut = cut.min(bytes.len() - 1);
        let result = codec::decode(&bytes[..bytes.len() - cut]);
        prop_assert!(matches!(result, Err(TransferDomainError::MalformedPayload(_))));
    }
}
